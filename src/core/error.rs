#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("invalid quotes archive JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("quotes archive has no price series")]
    MissingSeries,

    #[error("quotes archive has {timestamps} timestamps but {prices} closing prices")]
    LengthMismatch { timestamps: usize, prices: usize },

    #[error("quotes archive contains no usable price points")]
    Empty,

    #[error("quotes archive is not newest-first (timestamp {timestamp} out of order)")]
    OutOfOrder { timestamp: i64 },
}

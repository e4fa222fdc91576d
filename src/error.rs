use thiserror::Error;

/// Failure taxonomy for market-data provider calls.
///
/// Callers treat `NoData` as "render a placeholder" and everything else as a
/// degraded (but non-fatal) provider problem. Nothing here aborts the
/// process.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Unavailable(String),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("malformed provider response: {0}")]
    Parse(String),
    #[error("no data available for {0}")]
    NoData(String),
    #[error("invalid symbol '{0}'")]
    InvalidSymbol(String),
}

impl ProviderError {
    /// True when the symbol resolved but simply has nothing to show.
    pub fn is_no_data(&self) -> bool {
        matches!(self, ProviderError::NoData(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ProviderError::Status(status.as_u16())
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

/// Failures from the narrative-model endpoint. All of them degrade to the
/// heuristic target; none propagate past the forecast builder.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("narrative model unreachable: {0}")]
    Network(String),
    #[error("narrative model rate limited")]
    RateLimited,
    #[error("narrative model returned HTTP {0}: {1}")]
    Api(u16, String),
    #[error("no numeric target in model reply")]
    NoTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_is_distinguishable() {
        assert!(ProviderError::NoData("XYZ".into()).is_no_data());
        assert!(!ProviderError::Status(502).is_no_data());
        assert!(!ProviderError::Unavailable("dns".into()).is_no_data());
    }
}

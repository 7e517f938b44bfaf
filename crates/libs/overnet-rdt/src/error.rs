#[derive(Debug, thiserror::Error)]
pub enum RdtError {
    #[error("window size must be at least 1")]
    WindowZero,

    #[error("window size {0} does not fit the 15-bit sequence space")]
    WindowTooLarge(u16),
}

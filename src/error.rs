/// Turns a `Result` into an `Option`, logging the error.
///
/// For best-effort calls whose failure must not change control flow.
pub trait ResultOkLogExt<T, E> {
    fn ok_log(self, target: &str, context: &str) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self, target: &str, context: &str) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!(target: target, "{context}: {err}");
                None
            }
        }
    }
}

pub mod thirteenf;

pub(crate) mod tui;

/// Shortcut for required API elements.
pub(crate) mod http {
    pub(crate) use dotenv::var;
    pub(crate) use reqwest::Client as HttpClient;
}

// Readable elapsed-time fragment for the debug logs.
pub(crate) fn time_elapsed(start: std::time::Instant) -> String {
    format!("time elapsed: {:.2?}", start.elapsed())
}

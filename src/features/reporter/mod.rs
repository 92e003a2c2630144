mod http;

pub use http::HttpReporter;

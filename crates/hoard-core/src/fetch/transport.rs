//! Authenticated GET that streams the response body into a writer.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Credentials;
use crate::config::TransferConfig;

use super::error::TransferError;

/// Request capability handed to the fetch unit.
pub trait Transport: Send + Sync {
    /// GET `url`, writing the body to `sink`. Returns the number of body bytes written.
    /// Implementations must return an error for non-2xx responses.
    fn get(&self, url: &str, sink: &mut dyn Write) -> Result<u64, TransferError>;
}

/// Blocking libcurl transport, one easy handle per request.
pub struct CurlTransport {
    credentials: Arc<dyn Credentials>,
    opts: TransferConfig,
}

impl CurlTransport {
    pub fn new(credentials: Arc<dyn Credentials>, opts: TransferConfig) -> Self {
        Self { credentials, opts }
    }
}

impl Transport for CurlTransport {
    fn get(&self, url: &str, sink: &mut dyn Write) -> Result<u64, TransferError> {
        let headers = self.credentials.headers()?;

        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(Duration::from_secs(self.opts.connect_timeout_secs))?;
        // Abort if throughput stays below the limit for low_speed_time.
        easy.low_speed_limit(self.opts.low_speed_limit_bytes)?;
        easy.low_speed_time(Duration::from_secs(self.opts.low_speed_time_secs))?;
        if let Some(limit) = self.opts.total_timeout() {
            easy.timeout(limit)?;
        }
        if let Some(ua) = &self.opts.user_agent {
            easy.useragent(ua)?;
        }

        let mut list = curl::easy::List::new();
        for (k, v) in &headers {
            list.append(&format!("{}: {}", k, v))?;
        }
        if !headers.is_empty() {
            easy.http_headers(list)?;
        }

        let mut written = 0u64;
        let mut write_error: Option<std::io::Error> = None;
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| match sink.write_all(data) {
                Ok(()) => {
                    written += data.len() as u64;
                    Ok(data.len())
                }
                Err(e) => {
                    write_error = Some(e);
                    Ok(0) // abort transfer
                }
            })?;
            if let Err(e) = transfer.perform() {
                drop(transfer);
                if e.is_write_error() {
                    if let Some(io_err) = write_error.take() {
                        return Err(TransferError::Write(io_err));
                    }
                }
                return Err(TransferError::Curl(e));
            }
        }

        let code = easy.response_code()?;
        if code == 401 {
            return Err(TransferError::Unauthorized(code));
        }
        if !(200..300).contains(&code) {
            return Err(TransferError::Http(code));
        }
        Ok(written)
    }
}

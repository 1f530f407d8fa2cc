use crate::buffer::Buffer;

/// One parsed HTTP request.
///
/// `address` is the request path with the leading `/` stripped; an
/// empty address means the root document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub address: String,
    pub version: String,
}

impl Request {
    /// A `GET` for `address` (no leading slash).
    pub fn get(address: &str) -> Self {
        Self {
            method: "GET".to_string(),
            address: address.to_string(),
            version: "HTTP/1.1".to_string(),
        }
    }

    pub fn clear(&mut self) {
        self.method.clear();
        self.address.clear();
        self.version.clear();
    }

    /// Serializes the request line (plus the terminating empty line)
    /// into `out`.
    pub fn to_buffer(&self, out: &mut Buffer) {
        out.write(self.method.as_bytes());
        out.write(b" /");
        out.write(self.address.as_bytes());
        out.write(b" ");
        out.write(self.version.as_bytes());
        out.write(b"\r\n\r\n");
    }
}

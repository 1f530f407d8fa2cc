/// One parsed HTTP response.
#[derive(Debug, Default)]
pub struct Response {
    /// The full status line, e.g. `HTTP/1.1 200 OK`.
    pub status_line: String,

    /// Every header line after the status line, concatenated.
    pub header_remainder: String,

    /// Exactly `Content-Length` body bytes.
    pub body: Vec<u8>,
}

impl Response {
    pub fn clear(&mut self) {
        self.status_line.clear();
        self.header_remainder.clear();
        self.body.clear();
    }
}

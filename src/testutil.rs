//! Test fixtures: a one-shot HTTP server over a raw socket

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Accept connections one at a time, capture each raw request, optionally
/// stall, then write the canned response. Serves `hits` connections.
pub(crate) fn serve_n(
    response: Vec<u8>,
    delay: Duration,
    hits: usize,
) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for _ in 0..hits {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut buf = [0u8; 8192];
            let n = stream.read(&mut buf).unwrap_or(0);
            let _ = tx.send(String::from_utf8_lossy(&buf[..n]).into_owned());
            thread::sleep(delay);
            let _ = stream.write_all(&response);
        }
    });
    (format!("http://{addr}/"), rx)
}

pub(crate) fn serve(response: Vec<u8>, delay: Duration) -> (String, mpsc::Receiver<String>) {
    serve_n(response, delay, 1)
}

/// A minimal 200 response with a correct Content-Length
pub(crate) fn canned(body: &[u8], extra_headers: &str) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        body.len(),
        extra_headers
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

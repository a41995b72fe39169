//! End-to-end tests driving a real bound TCP socket through [`corehttpd::ServerBuilder`].

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use corehttpd::{
    parser::{HeaderToc, Method},
    pipeline::UrlCheckHook,
    server::ServerBuilder,
};

fn tempdir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let unique = format!(
        "corehttpd-test-{}-{:?}",
        std::process::id(),
        std::thread::current().id()
    );
    dir.push(unique);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn connect_with_retry(addr: SocketAddr) -> TcpStream {
    for _ in 0..50 {
        if let Ok(stream) = TcpStream::connect(addr) {
            return stream;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("could not connect to {addr}");
}

fn read_available(stream: &mut TcpStream, expect_close: bool) -> Vec<u8> {
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if !expect_close && headers_complete_with_body(&buf) {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    buf
}

fn headers_complete_with_body(buf: &[u8]) -> bool {
    let Some(pos) = find(buf, b"\r\n\r\n") else {
        return false;
    };
    let head = &buf[..pos];
    let content_length = String::from_utf8_lossy(head)
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length: ").or_else(|| line.strip_prefix("content-length: ")))
        .and_then(|v| v.trim().parse::<usize>().ok());
    match content_length {
        Some(len) => buf.len() >= pos + 4 + len,
        None => true,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[test]
fn get_http_1_0_serves_index_file_and_closes() {
    let root = tempdir();
    std::fs::write(root.join("index.html"), b"hi").unwrap();

    let server = ServerBuilder::new("127.0.0.1:0".parse().unwrap())
        .virtual_host(vec!["localhost".to_string()], root)
        .unwrap()
        .keep_alive(true)
        .build()
        .unwrap();
    let running = server.start().unwrap();
    let addr = running.local_addr();

    let mut stream = connect_with_retry(addr);
    stream.write_all(b"GET / HTTP/1.0\r\n\r\n").unwrap();

    let response = read_available(&mut stream, true);
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "got: {text}");
    assert!(text.contains("Content-Length: 2"));
    assert!(text.ends_with("hi"));

    running.stop();
}

#[test]
fn pipelined_keep_alive_requests_both_served_on_same_socket() {
    let root = tempdir();
    std::fs::write(root.join("a"), b"A").unwrap();
    std::fs::write(root.join("b"), b"B").unwrap();

    let server = ServerBuilder::new("127.0.0.1:0".parse().unwrap())
        .virtual_host(vec!["x".to_string()], root)
        .unwrap()
        .keep_alive(true)
        .build()
        .unwrap();
    let running = server.start().unwrap();
    let addr = running.local_addr();

    let mut stream = connect_with_retry(addr);
    stream
        .write_all(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    let response = read_available(&mut stream, false);
    let text = String::from_utf8_lossy(&response);

    assert!(text.contains('A'));
    assert!(text.contains('B'));
    assert_eq!(text.matches("200 OK").count(), 2);

    running.stop();
}

#[test]
fn unknown_vhost_falls_back_to_default_host() {
    let root = tempdir();
    std::fs::write(root.join("index.html"), b"default-host").unwrap();

    let server = ServerBuilder::new("127.0.0.1:0".parse().unwrap())
        .virtual_host(vec!["known.example".to_string()], root)
        .unwrap()
        .build()
        .unwrap();
    let running = server.start().unwrap();
    let addr = running.local_addr();

    let mut stream = connect_with_retry(addr);
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: unknown-vhost\r\n\r\n")
        .unwrap();

    let response = read_available(&mut stream, true);
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "got: {text}");
    assert!(text.ends_with("default-host"));

    running.stop();
}

struct DenySecret;

impl UrlCheckHook for DenySecret {
    fn check(&self, _method: Method, path: &str, _headers: &HeaderToc, _raw: &[u8]) -> bool {
        path != "/secret"
    }
}

#[test]
fn url_check_hook_denies_configured_path_only() {
    let root = tempdir();
    std::fs::write(root.join("secret"), b"top secret").unwrap();
    std::fs::write(root.join("public"), b"anyone can see this").unwrap();

    let server = ServerBuilder::new("127.0.0.1:0".parse().unwrap())
        .virtual_host(vec!["x".to_string()], root)
        .unwrap()
        .on_url_check(Arc::new(DenySecret))
        .build()
        .unwrap();
    let running = server.start().unwrap();
    let addr = running.local_addr();

    let mut denied = connect_with_retry(addr);
    denied
        .write_all(b"GET /secret HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let denied_response = String::from_utf8_lossy(&read_available(&mut denied, true)).into_owned();
    assert!(denied_response.starts_with("HTTP/1.1 404 Not Found\r\n"), "got: {denied_response}");

    let mut allowed = connect_with_retry(addr);
    allowed
        .write_all(b"GET /public HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let allowed_response = String::from_utf8_lossy(&read_available(&mut allowed, true)).into_owned();
    assert!(allowed_response.starts_with("HTTP/1.1 200 OK\r\n"), "got: {allowed_response}");
    assert!(allowed_response.ends_with("anyone can see this"));

    running.stop();
}

#[test]
fn path_traversal_is_rejected_with_forbidden() {
    let root = tempdir();
    std::fs::write(root.join("index.html"), b"hi").unwrap();

    let server = ServerBuilder::new("127.0.0.1:0".parse().unwrap())
        .virtual_host(vec!["x".to_string()], root)
        .unwrap()
        .build()
        .unwrap();
    let running = server.start().unwrap();
    let addr = running.local_addr();

    let mut stream = connect_with_retry(addr);
    stream
        .write_all(b"GET /../etc/passwd HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    let response = read_available(&mut stream, true);
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 403 Forbidden\r\n"), "got: {text}");

    running.stop();
}

#[test]
fn oversized_request_headers_yield_413_and_close() {
    let root = tempdir();
    std::fs::write(root.join("index.html"), b"hi").unwrap();

    let server = ServerBuilder::new("127.0.0.1:0".parse().unwrap())
        .virtual_host(vec!["x".to_string()], root)
        .unwrap()
        .build()
        .unwrap();
    let running = server.start().unwrap();
    let addr = running.local_addr();

    let mut stream = connect_with_retry(addr);
    let mut request = Vec::new();
    request.extend_from_slice(b"GET / HTTP/1.1\r\nHost: x\r\n");
    // Push past max_header_bytes without a terminating blank line, forcing HeaderTooLarge.
    for i in 0..2000 {
        request.extend_from_slice(format!("X-Filler-{i}: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n").as_bytes());
    }
    stream.write_all(&request).unwrap();

    let response = read_available(&mut stream, true);
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 413 Content Too Large\r\n"), "got: {text}");

    running.stop();
}

#[test]
fn accept_encoding_gzip_serves_precompressed_alternate() {
    let root = tempdir();
    std::fs::write(root.join("app.js"), b"plain").unwrap();
    std::fs::write(root.join("app.js.gz"), b"compressed").unwrap();

    let server = ServerBuilder::new("127.0.0.1:0".parse().unwrap())
        .virtual_host(vec!["x".to_string()], root)
        .unwrap()
        .build()
        .unwrap();
    let running = server.start().unwrap();
    let addr = running.local_addr();

    let mut stream = connect_with_retry(addr);
    stream
        .write_all(b"GET /app.js HTTP/1.1\r\nHost: x\r\nAccept-Encoding: gzip, deflate\r\n\r\n")
        .unwrap();
    let text = String::from_utf8_lossy(&read_available(&mut stream, true)).into_owned();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "got: {text}");
    assert!(text.contains("Content-Encoding: gzip"), "got: {text}");
    assert!(text.ends_with("compressed"), "got: {text}");

    let mut plain = connect_with_retry(addr);
    plain.write_all(b"GET /app.js HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let plain_text = String::from_utf8_lossy(&read_available(&mut plain, true)).into_owned();
    assert!(!plain_text.contains("Content-Encoding"), "got: {plain_text}");
    assert!(plain_text.ends_with("plain"), "got: {plain_text}");

    running.stop();
}

#[test]
fn oversized_content_length_yields_413_and_close() {
    let root = tempdir();
    std::fs::write(root.join("index.html"), b"hi").unwrap();

    let server = ServerBuilder::new("127.0.0.1:0".parse().unwrap())
        .virtual_host(vec!["x".to_string()], root)
        .unwrap()
        .max_request_size(65536)
        .build()
        .unwrap();
    let running = server.start().unwrap();
    let addr = running.local_addr();

    let mut stream = connect_with_retry(addr);
    stream
        .write_all(b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 1000000000\r\n\r\n")
        .unwrap();

    let response = read_available(&mut stream, true);
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 413 Content Too Large\r\n"), "got: {text}");

    running.stop();
}

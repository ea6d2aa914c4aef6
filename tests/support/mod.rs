//! Loopback servers used by the integration tests.
//!
//! All servers run on plain std sockets in background threads and live for
//! the duration of the test process.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::thread;
use std::time::Duration;

/// TCP server that echoes everything it reads back to the client, one
/// connection at a time per accept thread, until EOF.
pub fn echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// UDP server that echoes each datagram back to its sender.
pub fn udp_echo_server() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = socket.local_addr().unwrap();
    thread::spawn(move || {
        let mut buf = [0u8; 65536];
        while let Ok((n, peer)) = socket.recv_from(&mut buf) {
            let _ = socket.send_to(&buf[..n], peer);
        }
    });
    addr
}

/// TCP server that accepts connections and then neither reads nor writes,
/// holding them open.
pub fn silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let mut parked = Vec::new();
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            parked.push(stream);
        }
    });
    addr
}

/// TCP server that reads exactly one byte from each connection, echoes that
/// byte back, and then closes the connection. Sending the write-side FIN
/// before closing lets the client observe a clean EOF rather than a reset.
pub fn one_byte_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut byte = [0u8; 1];
            if stream.read_exact(&mut byte).is_ok() {
                let _ = stream.write_all(&byte);
            }
            let _ = stream.shutdown(std::net::Shutdown::Write);
            drop(stream);
        }
    });
    addr
}

/// An address nothing listens on: binding then dropping a listener leaves
/// the port closed, so connects are refused.
pub fn refused_endpoint() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// A listener that never accepts, with its backlog already exhausted so
/// further connect attempts neither complete nor fail.
///
/// Returns the listener and filler connections; keep both alive for the
/// duration of the test.
pub fn saturated_listener() -> (socket2::Socket, SocketAddr, Vec<TcpStream>) {
    use socket2::{Domain, Protocol, Socket, Type};

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap();
    socket.bind(&"127.0.0.1:0".parse::<SocketAddr>().unwrap().into()).unwrap();
    socket.listen(0).unwrap();
    let addr = socket.local_addr().unwrap().as_socket().unwrap();

    // Fill the accept queue; once it is full the kernel stops answering SYNs
    // and later connects just hang.
    let mut fillers = Vec::new();
    for _ in 0..4 {
        if let Ok(stream) = TcpStream::connect_timeout(&addr, Duration::from_millis(200)) {
            fillers.push(stream);
        }
    }
    (socket, addr, fillers)
}

/// HTTP/1.1 server that reads one request head and answers with `response`
/// verbatim, then closes the connection.
pub fn http_server(response: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            thread::spawn(move || {
                if read_request_head(&mut stream) {
                    let _ = stream.write_all(response);
                }
            });
        }
    });
    addr
}

/// HTTP/1.1 server that reads one request head and immediately closes the
/// connection without responding.
pub fn http_closing_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            read_request_head(&mut stream);
            drop(stream);
        }
    });
    addr
}

/// HTTP/1.1 server that reads one request head and then goes silent with the
/// connection held open.
pub fn http_silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let mut parked = Vec::new();
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            read_request_head(&mut stream);
            parked.push(stream);
        }
    });
    addr
}

fn read_request_head(stream: &mut TcpStream) -> bool {
    let mut head = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return false,
            Ok(n) => {
                head.extend_from_slice(&buf[..n]);
                if head.windows(4).any(|window| window == b"\r\n\r\n") {
                    return true;
                }
                if head.len() > 64 * 1024 {
                    return false;
                }
            }
        }
    }
}

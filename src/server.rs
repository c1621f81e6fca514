//! Control socket.
//!
//! Newline-delimited JSON over TCP on the loopback interface, strict
//! request/reply lockstep per connection. Connections get a reader thread
//! each; every parsed line is forwarded to the single dispatcher loop
//! through a channel along with a reply channel, and the reader blocks until
//! the reply comes back. The dispatcher never learns about sockets.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, warn};

/// One frame awaiting dispatch, with the channel its reply goes back on.
pub struct ControlRequest {
    pub frame: String,
    pub reply_tx: mpsc::Sender<String>,
}

/// Bind the control socket and start accepting connections. A bind failure
/// is fatal and reported to the caller; everything after that is logged and
/// survived.
pub fn spawn(port: u16, req_tx: mpsc::Sender<ControlRequest>) -> std::io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))?;
    debug!(port, "control socket listening");

    thread::Builder::new()
        .name("control-accept".to_string())
        .spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let req_tx = req_tx.clone();
                        let spawned = thread::Builder::new()
                            .name("control-conn".to_string())
                            .spawn(move || handle_connection(stream, req_tx));
                        if let Err(e) = spawned {
                            warn!("failed to spawn connection thread: {e}");
                        }
                    }
                    Err(e) => warn!("failed to accept control connection: {e}"),
                }
            }
        })?;

    Ok(())
}

fn handle_connection(stream: TcpStream, req_tx: mpsc::Sender<ControlRequest>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".to_string());
    debug!(peer = %peer, "control client connected");

    let reader = match stream.try_clone() {
        Ok(clone) => BufReader::new(clone),
        Err(e) => {
            warn!(peer = %peer, "failed to clone control stream: {e}");
            return;
        }
    };
    let mut writer = stream;
    let (reply_tx, reply_rx) = mpsc::channel::<String>();

    for line in reader.lines() {
        let frame = match line {
            Ok(frame) => frame,
            Err(e) => {
                debug!(peer = %peer, "control read error: {e}");
                break;
            }
        };

        let request = ControlRequest {
            frame,
            reply_tx: reply_tx.clone(),
        };
        if req_tx.send(request).is_err() {
            // Dispatcher is gone; the daemon is shutting down.
            break;
        }
        let reply = match reply_rx.recv() {
            Ok(reply) => reply,
            Err(_) => break,
        };
        if writeln!(writer, "{reply}").and_then(|()| writer.flush()).is_err() {
            break;
        }
    }

    debug!(peer = %peer, "control client disconnected");
}

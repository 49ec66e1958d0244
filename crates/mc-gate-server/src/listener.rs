//! Accept loop: admits clients, dials the wrapped server and runs the two
//! tunnels of each connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mc_gate_proto::packets::{Disconnect, Packet};
use mc_gate_proto::types::Direction;

use crate::connection::Connection;
use crate::error::TunnelError;
use crate::state::ProxyState;
use crate::tunnel::{Tunnel, TunnelExit, TunnelSettings};

/// How long tunnels get to stop on their own after the connection closes.
const TEARDOWN_GRACE: Duration = Duration::from_secs(5);

pub async fn run(state: Arc<ProxyState>) -> io::Result<()> {
    let listener = TcpListener::bind(state.config.listen_addr()).await?;
    info!(
        "Listening on {}, forwarding to {}",
        listener.local_addr()?,
        state.config.server_addr()
    );
    accept_loop(state, listener).await;
    Ok(())
}

/// Accept until shutdown is requested.
pub async fn accept_loop(state: Arc<ProxyState>, listener: TcpListener) {
    let mut shutdown = state.shutdown_signal();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tokio::spawn(serve(state.clone(), socket, peer));
                }
                Err(e) => warn!("Accept failed: {e}"),
            },
            _ = shutdown.changed() => break,
        }
    }
    info!("Stopped accepting connections");
}

/// Send a kick packet to a client that never got a connection slot.
async fn refuse(mut socket: TcpStream, reason: &str) {
    let packet = Disconnect::new(reason).to_bytes();
    let _ = socket.write_all(&packet).await;
    let _ = socket.shutdown().await;
}

async fn serve(state: Arc<ProxyState>, client: TcpStream, peer: SocketAddr) {
    let ip = peer.ip();
    if let Some(ban) = state.policy.access.ip_ban(ip) {
        info!("Refused banned address {ip}: {}", ban.reason);
        refuse(client, &format!("You are banned: {}", ban.reason)).await;
        return;
    }

    let robot = state.robots.contains(ip);
    let (connection, outbox) = match state.pool.acquire(peer, robot) {
        Ok(acquired) => acquired,
        Err(e) => {
            warn!("Refused {peer}: {e}");
            refuse(client, "The server is full!").await;
            return;
        }
    };

    let server = match TcpStream::connect(state.config.server_addr()).await {
        Ok(server) => server,
        Err(e) => {
            warn!(
                "Cannot reach wrapped server at {}: {e}",
                state.config.server_addr()
            );
            state.pool.release(&connection);
            refuse(client, "The server is not available").await;
            return;
        }
    };
    if robot {
        debug!("Robot connection from {peer} ({})", connection.id());
    } else {
        info!("Connection from {peer} ({})", connection.id());
    }

    let _ = client.set_nodelay(true);
    let _ = server.set_nodelay(true);
    let (client_read, client_write) = client.into_split();
    let (server_read, server_write) = server.into_split();

    let tunnel_config = &state.config.tunnel;
    let inbound = Tunnel::new(
        Direction::Serverbound,
        client_read,
        server_write,
        connection.clone(),
        state.clone(),
        None,
        TunnelSettings::for_direction(tunnel_config, Direction::Serverbound),
    );
    let outbound = Tunnel::new(
        Direction::Clientbound,
        server_read,
        client_write,
        connection.clone(),
        state.clone(),
        Some(outbox),
        TunnelSettings::for_direction(tunnel_config, Direction::Clientbound),
    );

    let inbound = tokio::spawn(inbound.run());
    let outbound = tokio::spawn(outbound.run());
    let aborts = [inbound.abort_handle(), outbound.abort_handle()];
    let watchdog = async {
        let mut closed = connection.closed_signal();
        let _ = closed.wait_for(|closed| *closed).await;
        tokio::time::sleep(TEARDOWN_GRACE).await;
        debug!("Aborting tunnels of {connection} after close");
        for abort in &aborts {
            abort.abort();
        }
        std::future::pending::<()>().await
    };
    tokio::select! {
        _ = async {
            tokio::join!(
                supervise(&connection, inbound),
                supervise(&connection, outbound),
            )
        } => {}
        _ = watchdog => {}
    }
    // The slot is freed only once both tasks are gone.
    state.pool.release(&connection);

    match (connection.name(), connection.kick_reason()) {
        (Some(name), Some(reason)) if !robot => info!("{name} left: {reason}"),
        (Some(name), None) if !robot => info!("{name} left"),
        _ => debug!("{peer} disconnected ({})", connection.id()),
    }
}

/// Tunnels close their connection themselves; a panicked one cannot.
async fn supervise(
    connection: &Connection,
    task: JoinHandle<Result<TunnelExit, TunnelError>>,
) {
    match task.await {
        Ok(_) => {}
        Err(e) if e.is_cancelled() => debug!("Tunnel task for {connection} aborted"),
        Err(e) => {
            warn!("Tunnel task for {connection} failed: {e}");
            connection.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::policy::Policy;
    use bytes::BytesMut;
    use mc_gate_proto::codec::ProtoDecode;
    use mc_gate_proto::packets::{id, Chat, Handshake};
    use tokio::io::AsyncReadExt;

    async fn read_packet<P: ProtoDecode>(socket: &mut TcpStream, packet_id: u8) -> P {
        let mut buf = BytesMut::new();
        loop {
            if !buf.is_empty() {
                assert_eq!(buf[0], packet_id);
                let mut body = &buf[1..];
                match P::proto_decode(&mut body) {
                    Ok(packet) => return packet,
                    Err(e) => assert!(e.is_incomplete(), "{e}"),
                }
            }
            let mut chunk = [0u8; 256];
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "socket closed early");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    #[tokio::test]
    async fn relays_both_ways_and_kicks_on_shutdown() {
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = GateConfig::for_tests(2);
        config.server.port = backend.local_addr().unwrap().port();
        let policy = Policy::in_memory(&config);
        let state = Arc::new(ProxyState::for_tests(config, policy));

        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let front_addr = front.local_addr().unwrap();
        let accept = tokio::spawn(accept_loop(state.clone(), front));

        let mut client = TcpStream::connect(front_addr).await.unwrap();
        let (mut server, _) = backend.accept().await.unwrap();

        let handshake = Handshake {
            username: "Steve".into(),
        };
        client.write_all(&handshake.to_bytes()).await.unwrap();
        let seen: Handshake = read_packet(&mut server, id::HANDSHAKE).await;
        assert_eq!(seen, handshake);

        server
            .write_all(&Chat::new("Welcome").to_bytes())
            .await
            .unwrap();
        let chat: Chat = read_packet(&mut client, id::CHAT).await;
        assert_eq!(chat.message, "Welcome");

        state.request_shutdown();
        accept.await.unwrap();
        state.kick_all("Server closed");
        let kick: Disconnect = read_packet(&mut client, id::DISCONNECT).await;
        assert_eq!(kick.reason, "Server closed");
    }

    #[tokio::test]
    async fn banned_address_is_refused() {
        let mut config = GateConfig::for_tests(1);
        config.server.port = 1;
        let dir = crate::policy::store::testing::TempDir::new("listener_ban");
        std::fs::write(
            dir.file("banned-ips.json"),
            r#"{"127.0.0.1": {"reason": "scanner"}}"#,
        )
        .unwrap();
        config.data.directory = dir.0.display().to_string();
        let policy = Policy::load(&config);
        let state = Arc::new(ProxyState::for_tests(config, policy));

        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let front_addr = front.local_addr().unwrap();
        tokio::spawn(accept_loop(state.clone(), front));

        let mut client = TcpStream::connect(front_addr).await.unwrap();
        let kick: Disconnect = read_packet(&mut client, id::DISCONNECT).await;
        assert_eq!(kick.reason, "You are banned: scanner");
        assert_eq!(state.pool.active_count(), 0);
        state.request_shutdown();
    }
}

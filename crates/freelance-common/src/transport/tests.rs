//! Integration tests for the transport layer
//!
//! These tests run a bound and a connecting `TcpRouter` against each other on
//! the loopback interface.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::protocol::{Message, Protocol};
    use crate::transport::{Router, TcpRouter};

    const WAIT: Duration = Duration::from_secs(5);

    async fn recv(router: &mut TcpRouter) -> Message {
        timeout(WAIT, router.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("router closed")
    }

    #[tokio::test]
    async fn test_bound_router_reports_endpoint() {
        let server = TcpRouter::bind("tcp://127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        assert_ne!(addr.port(), 0);
        assert_eq!(server.endpoint().unwrap(), format!("tcp://{}", addr));
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_endpoint() {
        assert!(TcpRouter::bind("udp://127.0.0.1:0").await.is_err());
    }

    #[tokio::test]
    async fn test_request_and_reply_are_routed_by_identity() {
        let mut server = TcpRouter::bind("tcp://127.0.0.1:0").await.unwrap();
        let endpoint = server.endpoint().unwrap();

        let mut client = TcpRouter::new();
        client.connect(&endpoint).unwrap();

        let protocol = Protocol::new("client").unwrap();
        client.send(protocol.ping(&endpoint).unwrap()).unwrap();

        // server sees [peer-id, PING, client]
        let ping = recv(&mut server).await;
        assert_eq!(ping.len(), 3);
        assert_eq!(ping.get_str(1), Some("PING"));
        assert_eq!(ping.get_str(2), Some("client"));

        let reply = Protocol::new("server").unwrap().reply(ping, |_| Vec::new());
        server.send(reply).unwrap();

        // client sees [endpoint, PONG, server]
        let pong = recv(&mut client).await;
        assert_eq!(pong.get_str(0), Some(endpoint.as_str()));
        assert_eq!(pong.get_str(1), Some("PONG"));
        assert_eq!(pong.get_str(2), Some("server"));
    }

    #[tokio::test]
    async fn test_messages_queued_before_server_starts_are_delivered() {
        // reserve a port, then release it so the first dials fail
        let placeholder = TcpRouter::bind("tcp://127.0.0.1:0").await.unwrap();
        let addr = placeholder.local_addr().unwrap();
        drop(placeholder);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let endpoint = format!("tcp://{}", addr);
        let mut client = TcpRouter::new().with_reconnect_interval(Duration::from_millis(20));
        client.connect(&endpoint).unwrap();
        client
            .send(Message::from([endpoint.as_str(), "PING", "client"]))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut server = TcpRouter::bind(&endpoint).await.unwrap();

        let ping = recv(&mut server).await;
        assert_eq!(ping.get_str(1), Some("PING"));
    }

    #[tokio::test]
    async fn test_binary_frames_survive_the_wire() {
        let mut server = TcpRouter::bind("tcp://127.0.0.1:0").await.unwrap();
        let endpoint = server.endpoint().unwrap();

        let mut client = TcpRouter::new();
        client.connect(&endpoint).unwrap();

        let payload = vec![0u8, 1, 2, 0xFF, 0xFE];
        let message = Message::from([endpoint.as_str(), "7", "client"]).with(payload.clone());
        client.send(message).unwrap();

        let received = recv(&mut server).await;
        assert_eq!(received.len(), 4);
        assert_eq!(received.last(), Some(payload.as_slice()));
    }
}

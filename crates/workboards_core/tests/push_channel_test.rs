//! Integration tests for the WebSocket push channel against a local server

#[cfg(feature = "native-sync")]
mod push_channel_tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;
    use workboards_core::transport::push_channel::{
        self, PROBE, PushChannelConfig, ReconnectPolicy, TransportEvent,
    };
    use workboards_core::transport::{ConnectionState, TransportTiming};

    const UPDATE: &str = r#"{"type":"item.updated","item":{"id":"a","boardId":"b1","groupId":"g1","name":"A","order":1.0,"status":"Todo"}}"#;

    fn config(url: String, max_attempts: u32) -> PushChannelConfig {
        PushChannelConfig {
            url,
            timing: TransportTiming {
                heartbeat_interval: Duration::from_millis(100),
                heartbeat_timeout: Duration::from_secs(1),
                poll_interval: Duration::from_secs(5),
            },
            reconnect: ReconnectPolicy {
                max_attempts,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
            },
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Option<TransportEvent> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
    }

    fn state(state: ConnectionState) -> Option<TransportEvent> {
        Some(TransportEvent::StateChanged(state))
    }

    #[tokio::test]
    async fn test_forwards_messages_and_sends_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(UPDATE.into())).await.unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return text.to_string(),
                    Some(Ok(_)) => continue,
                    other => panic!("connection ended before probe: {:?}", other),
                }
            }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = push_channel::spawn(config(format!("ws://{}/api/ws/boards/b1", addr), 3), tx);

        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Connecting));
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Connected));
        assert_eq!(
            next_event(&mut rx).await,
            Some(TransportEvent::Message(UPDATE.to_string()))
        );

        let probe = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(probe, PROBE);
        handle.close();
    }

    #[tokio::test]
    async fn test_reconnects_after_server_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut first = tokio_tungstenite::accept_async(stream).await.unwrap();
            first.close(None).await.unwrap();

            let (stream, _) = listener.accept().await.unwrap();
            let mut second = tokio_tungstenite::accept_async(stream).await.unwrap();
            while second.next().await.is_some() {}
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = push_channel::spawn(config(format!("ws://{}/api/ws/boards/b1", addr), 3), tx);

        let expected = [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ];
        for expected in expected {
            assert_eq!(next_event(&mut rx).await, state(expected));
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = push_channel::spawn(config(format!("ws://{}/api/ws/boards/b1", addr), 2), tx);

        for _ in 0..3 {
            assert_eq!(next_event(&mut rx).await, state(ConnectionState::Connecting));
            assert_eq!(next_event(&mut rx).await, state(ConnectionState::Disconnected));
        }
        assert_eq!(next_event(&mut rx).await, None);
        assert!(handle.is_finished());
    }
}

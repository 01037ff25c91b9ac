use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use rtc_bridge::CommandDispatcher;
use rtc_protocol::{ChannelMessage, ChannelRead, ChannelWrite, MethodCall, ProtocolError};

use crate::connections::ConnectionManager;

/// One method channel connection
///
/// Reads `Call` frames and hands them to the dispatcher in arrival order.
/// Replies and events come back through the connection's outbound queue and
/// are written by a separate task.
pub struct CallerConnection {
    stream: TcpStream,
    addr: SocketAddr,
    dispatcher: Arc<CommandDispatcher>,
    connections: ConnectionManager,
    max_frame_size: usize,
}

impl CallerConnection {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        dispatcher: Arc<CommandDispatcher>,
        connections: ConnectionManager,
        max_frame_size: usize,
    ) -> Self {
        info!("New caller connected from {}", addr);
        Self {
            stream,
            addr,
            dispatcher,
            connections,
            max_frame_size,
        }
    }

    pub async fn handle(self) {
        let Self {
            stream,
            addr,
            dispatcher,
            connections,
            max_frame_size,
        } = self;
        let (mut reader, mut writer) = stream.into_split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ChannelMessage>();
        connections.register(addr, outbound_tx.clone());

        let writer_task = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = writer
                    .write_channel_message_with_max_size(&message, max_frame_size)
                    .await
                {
                    error!("Failed to write to caller {}: {}", addr, e);
                    return;
                }
            }
            let _ = writer.shutdown().await;
            debug!("Writer for caller {} finished", addr);
        });

        loop {
            match reader.read_channel_message_with_max_size(max_frame_size).await {
                Ok(ChannelMessage::Call(call)) => {
                    dispatch_call(&dispatcher, addr, call, outbound_tx.clone());
                }
                Ok(other) => {
                    warn!("Ignoring unexpected message from caller {}: {:?}", addr, other);
                }
                Err(ProtocolError::ConnectionClosed) => {
                    info!("Caller {} disconnected", addr);
                    break;
                }
                Err(e) => {
                    error!("Failed to read from caller {}: {}", addr, e);
                    break;
                }
            }
        }

        // Pending replies still hold queue handles; the writer drains them and
        // stops once the last one is gone.
        connections.unregister(&addr);
        drop(outbound_tx);
        if let Err(e) = writer_task.await {
            error!("Writer for caller {} failed: {}", addr, e);
        }
    }
}

fn dispatch_call(
    dispatcher: &CommandDispatcher,
    addr: SocketAddr,
    call: MethodCall,
    outbound: mpsc::UnboundedSender<ChannelMessage>,
) {
    let MethodCall {
        id,
        method,
        arguments,
    } = call;

    // Engine calls are synchronous; run them in place so calls from one
    // connection still reach the engine in arrival order.
    tokio::task::block_in_place(|| {
        dispatcher.dispatch(&method, &arguments, move |result| {
            if outbound.send(ChannelMessage::Reply { id, result }).is_err() {
                debug!("Reply {} for caller {} dropped: connection closed", id, addr);
            }
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtc_bridge::{LoopbackFactory, SurfaceRegistry, marshaller};
    use rtc_protocol::{Arguments, EventMessage, MethodResult};
    use std::time::Duration;
    use tokio::net::TcpListener;

    const CALLS: u64 = 20;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_replies_survive_half_close() {
        let (marshaller, delivery) = marshaller::channel();
        let _delivery = delivery.spawn("rtc-delivery").unwrap();
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::new(LoopbackFactory::new()),
            Arc::new(SurfaceRegistry::new()),
            marshaller,
            Arc::new(|_: EventMessage| {}),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_addr = listener.local_addr().unwrap();
        let connections = ConnectionManager::new();
        let server = tokio::spawn(async move {
            let (stream, addr) = listener.accept().await.unwrap();
            CallerConnection::new(
                stream,
                addr,
                dispatcher,
                connections,
                rtc_protocol::DEFAULT_MAX_MESSAGE_SIZE,
            )
            .handle()
            .await;
        });

        let mut client = TcpStream::connect(server_addr).await.unwrap();
        for id in 0..CALLS {
            let call = MethodCall::new(id, "teleport", Arguments::new());
            client
                .write_channel_message(&ChannelMessage::Call(call))
                .await
                .unwrap();
        }
        client.shutdown().await.unwrap();

        let mut ids = Vec::new();
        let read_all = async {
            loop {
                match client.read_channel_message().await {
                    Ok(ChannelMessage::Reply { id, result }) => {
                        assert_eq!(result, MethodResult::NotImplemented);
                        ids.push(id);
                    }
                    Ok(other) => panic!("unexpected message {:?}", other),
                    Err(ProtocolError::ConnectionClosed) => break,
                    Err(e) => panic!("read failed: {}", e),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), read_all)
            .await
            .unwrap();

        assert_eq!(ids, (0..CALLS).collect::<Vec<_>>());
        server.await.unwrap();
    }
}

use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::dto::{room::RoomSnapshot, sse::ServerEvent};

/// SSE event name carrying a room view-model snapshot.
const EVENT_ROOM: &str = "room";

/// Convert a room's watch channel into an SSE response.
///
/// The current snapshot is sent immediately so a reconnecting client
/// repaints without waiting for the next change; every subsequent publish
/// follows as its own event. The forwarder task ends when the client
/// disconnects or the room session closes, whichever comes first.
pub fn room_stream(
    mut view: watch::Receiver<RoomSnapshot>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            let snapshot = view.borrow_and_update().clone();
            match ServerEvent::json(Some(EVENT_ROOM.to_string()), &snapshot) {
                Ok(payload) => {
                    let mut event = Event::default().data(payload.data);
                    if let Some(name) = payload.event {
                        event = event.event(name);
                    }
                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to serialize room snapshot for SSE");
                }
            }

            tokio::select! {
                _ = tx.closed() => break,
                changed = view.changed() => {
                    // The session closed; end the stream with it.
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("room SSE stream disconnected");
    });

    // response stream reads from mpsc; when the client disconnects axum
    // drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

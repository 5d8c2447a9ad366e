//! WebSocket message streams as fragment sources.

use futures::{Stream, StreamExt, future};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{error::QueryError, stream::FragmentSource};

/// Adapt a WebSocket message stream into a fragment source.
///
/// Each text message becomes one fragment. Binary messages are accepted when
/// they hold UTF-8 text. Control frames are skipped; tungstenite answers
/// pings itself while the socket is read. A close frame ends the source.
pub fn text_fragments<S>(socket: S) -> FragmentSource
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Send + 'static,
{
    socket
        .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
        .filter_map(|message| future::ready(fragment(message)))
        .boxed()
}

fn fragment(message: Result<Message, tungstenite::Error>) -> Option<Result<String, QueryError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(data)) => Some(
            std::str::from_utf8(&data)
                .map(str::to_owned)
                .map_err(QueryError::Utf8),
        ),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_) | Message::Close(_)) => None,
        Err(error) => Some(Err(error.into())),
    }
}

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use job_broadcast::{Frame, Subscription};
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Serve a subscription as a server-sent event stream.
///
/// The subscription moves into the response body, so a client that disconnects
/// drops it and is deregistered from the job.
pub fn stream<S>(subscription: Subscription<S>) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
	S: Serialize + Send + 'static,
{
	let events = subscription.into_frames().map(|frame| Ok(to_event(frame)));
	Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
}

fn to_event(frame: Frame) -> Event {
	let event = match frame.event {
		Some(name) => Event::default().event(name),
		None => Event::default(),
	};
	event.data(frame.data)
}

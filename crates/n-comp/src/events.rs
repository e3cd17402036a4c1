// SPDX-License-Identifier: MIT
//
// Event sink: how the compositor tells the outside world about the tree.
//
// The compositor never reaches for a global bus. It is handed one sink at
// construction and calls it, under its own broadcast lock, whenever a
// subtree goes live or stops being live and whenever focus moves. What
// happens next (delivering to plugins, queueing, dropping) is the sink's
// business.

use std::sync::mpsc::{Receiver, Sender, channel};

use crate::drawable::DrawableId;

/// Receiver of tree notifications.
pub trait EventSink: Send {
    /// `id` became reachable from the root.
    fn register(&mut self, id: DrawableId);

    /// `id` is no longer reachable from the root.
    fn unregister(&mut self, id: DrawableId);

    /// Focus moved to `target`, or was cleared. `recipients` is every
    /// attached drawable at the time of the change.
    fn focus_changed(&mut self, target: Option<DrawableId>, recipients: &[DrawableId]);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEvents;

impl EventSink for NullEvents {
    fn register(&mut self, _id: DrawableId) {}

    fn unregister(&mut self, _id: DrawableId) {}

    fn focus_changed(&mut self, _target: Option<DrawableId>, _recipients: &[DrawableId]) {}
}

/// One tree notification, as delivered by [`ChannelEvents`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositorEvent {
    Registered(DrawableId),
    Unregistered(DrawableId),
    FocusChanged {
        target: Option<DrawableId>,
        recipients: Vec<DrawableId>,
    },
}

/// Forwards notifications over an mpsc channel. A dropped receiver is not
/// an error; events are simply discarded.
#[derive(Debug)]
pub struct ChannelEvents {
    tx: Sender<CompositorEvent>,
}

impl ChannelEvents {
    /// A sink and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, Receiver<CompositorEvent>) {
        let (tx, rx) = channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: CompositorEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver gone, dropping event");
        }
    }
}

impl EventSink for ChannelEvents {
    fn register(&mut self, id: DrawableId) {
        self.send(CompositorEvent::Registered(id));
    }

    fn unregister(&mut self, id: DrawableId) {
        self.send(CompositorEvent::Unregistered(id));
    }

    fn focus_changed(&mut self, target: Option<DrawableId>, recipients: &[DrawableId]) {
        self.send(CompositorEvent::FocusChanged {
            target,
            recipients: recipients.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU64;

    fn id(n: u64) -> DrawableId {
        DrawableId::from_raw(NonZeroU64::new(n).unwrap())
    }

    #[test]
    fn channel_forwards_in_order() {
        let (mut sink, rx) = ChannelEvents::new();
        sink.register(id(2));
        sink.focus_changed(Some(id(2)), &[id(2), id(3)]);
        sink.unregister(id(2));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                CompositorEvent::Registered(id(2)),
                CompositorEvent::FocusChanged {
                    target: Some(id(2)),
                    recipients: vec![id(2), id(3)],
                },
                CompositorEvent::Unregistered(id(2)),
            ]
        );
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (mut sink, rx) = ChannelEvents::new();
        drop(rx);
        sink.register(id(5));
        sink.focus_changed(None, &[]);
    }
}

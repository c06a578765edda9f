//! Timestamp-ordered SPSC event queue between the control and render sides.
//!
//! The control side pushes into a bounded ring; the render side drains the
//! ring into a fixed-capacity min-heap and pops events whose time has come.
//! Neither side blocks or allocates after construction.

use core::cmp::Ordering;
use heapless::binary_heap::{BinaryHeap, Min};
use pb_ir::ScheduledEvent;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Events held on the render side awaiting their timestamp.
pub const PENDING_CAPACITY: usize = 256;

/// Anything that accepts scheduled events from the control side.
pub trait EventSink {
    /// Queue an event. Returns false if it was not accepted; the caller
    /// keeps its cursor and retries on a later tick.
    fn submit(&mut self, event: ScheduledEvent) -> bool;
}

impl EventSink for Vec<ScheduledEvent> {
    fn submit(&mut self, event: ScheduledEvent) -> bool {
        self.push(event);
        true
    }
}

/// Create a connected producer/consumer pair with room for `capacity`
/// in-flight events.
pub fn event_channel(capacity: usize) -> (EventProducer, EventConsumer) {
    let (producer, consumer) = HeapRb::<ScheduledEvent>::new(capacity.max(1)).split();
    (
        EventProducer { ring: producer },
        EventConsumer { ring: consumer, pending: BinaryHeap::new(), seq: 0 },
    )
}

/// Control-side half.
pub struct EventProducer {
    ring: HeapProd<ScheduledEvent>,
}

impl EventProducer {
    /// Events pushed but not yet drained by the render side.
    pub fn in_flight(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }
}

impl EventSink for EventProducer {
    fn submit(&mut self, event: ScheduledEvent) -> bool {
        if !event.time.is_finite() {
            log::warn!("dropping event with non-finite time");
            return true;
        }
        self.ring.try_push(event).is_ok()
    }
}

#[derive(Clone, Copy, Debug)]
struct Pending {
    event: ScheduledEvent,
    /// Arrival order; breaks ties between equal timestamps
    seq: u64,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.event.time.total_cmp(&other.event.time).then(self.seq.cmp(&other.seq))
    }
}

/// Render-side half.
pub struct EventConsumer {
    ring: HeapCons<ScheduledEvent>,
    pending: BinaryHeap<Pending, Min, PENDING_CAPACITY>,
    seq: u64,
}

impl EventConsumer {
    /// Move newly arrived events from the ring into the ordered heap.
    pub fn poll(&mut self) {
        while self.pending.len() < PENDING_CAPACITY {
            let Some(event) = self.ring.try_pop() else { break };
            let seq = self.seq;
            self.seq += 1;
            // len < capacity was checked above
            let _ = self.pending.push(Pending { event, seq });
        }
    }

    /// Pop the earliest event if it is due at `now`.
    #[inline]
    pub fn pop_due(&mut self, now: f64) -> Option<ScheduledEvent> {
        match self.pending.peek() {
            Some(p) if p.event.time <= now => self.pending.pop().map(|p| p.event),
            _ => None,
        }
    }

    /// Timestamp of the earliest pending event.
    pub fn next_time(&self) -> Option<f64> {
        self.pending.peek().map(|p| p.event.time)
    }

    /// Events waiting in the heap plus those still in the ring.
    pub fn len(&self) -> usize {
        self.pending.len() + self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pb_ir::{EventPayload, EventTarget};

    fn ev(time: f64, note: u8) -> ScheduledEvent {
        ScheduledEvent::note_on(time, note, 0.5)
    }

    fn note_of(e: ScheduledEvent) -> u8 {
        match e.payload {
            EventPayload::NoteOn { note, .. } => note,
            other => panic!("expected NoteOn, got {:?}", other),
        }
    }

    #[test]
    fn event_ordering() {
        let (mut tx, mut rx) = event_channel(16);
        assert!(tx.submit(ev(1.0, 10)));
        assert!(tx.submit(ev(0.5, 5)));
        assert!(tx.submit(ev(1.5, 15)));
        rx.poll();

        assert_eq!(note_of(rx.pop_due(10.0).unwrap()), 5);
        assert_eq!(note_of(rx.pop_due(10.0).unwrap()), 10);
        assert_eq!(note_of(rx.pop_due(10.0).unwrap()), 15);
        assert!(rx.pop_due(10.0).is_none());
    }

    #[test]
    fn pop_due_respects_time() {
        let (mut tx, mut rx) = event_channel(16);
        tx.submit(ev(1.0, 1));
        tx.submit(ev(2.0, 2));
        rx.poll();

        assert!(rx.pop_due(0.99).is_none());
        assert_eq!(note_of(rx.pop_due(1.0).unwrap()), 1);
        assert!(rx.pop_due(1.5).is_none());
        assert_eq!(rx.next_time(), Some(2.0));
    }

    #[test]
    fn equal_times_keep_arrival_order() {
        let (mut tx, mut rx) = event_channel(16);
        for n in 0..5 {
            tx.submit(ev(1.0, n));
        }
        rx.poll();
        let got: Vec<u8> = (0..5).map(|_| note_of(rx.pop_due(1.0).unwrap())).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn interleaved_producers_are_merged() {
        let (mut tx, mut rx) = event_channel(32);
        // a loop scheduler and a sequencer flush their lookahead windows in turn
        for t in [0.0, 0.5, 1.0] {
            tx.submit(ScheduledEvent::new(t, EventTarget::Chopper, EventPayload::Retrigger));
        }
        for t in [0.125, 0.25, 0.375, 0.625] {
            tx.submit(ev(t, 1));
        }
        rx.poll();
        let mut last = f64::NEG_INFINITY;
        let mut count = 0;
        while let Some(e) = rx.pop_due(f64::MAX) {
            assert!(e.time >= last);
            last = e.time;
            count += 1;
        }
        assert_eq!(count, 7);
    }

    #[test]
    fn full_ring_rejects() {
        let (mut tx, mut rx) = event_channel(2);
        assert!(tx.submit(ev(0.0, 0)));
        assert!(tx.submit(ev(0.1, 1)));
        assert!(tx.is_full());
        assert!(!tx.submit(ev(0.2, 2)));
        rx.poll();
        assert!(tx.submit(ev(0.2, 2)));
        assert_eq!(rx.len(), 3);
    }

    #[test]
    fn empty_queue_yields_nothing() {
        let (_tx, mut rx) = event_channel(4);
        rx.poll();
        assert!(rx.is_empty());
        assert!(rx.pop_due(100.0).is_none());
    }
}

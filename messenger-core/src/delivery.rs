//! Trackers, delivery records and status codes.

use std::collections::VecDeque;

use crate::link::LinkId;
use crate::message::Message;
use crate::protocol::{DeliveryState, ErrorCondition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Opaque, copyable delivery handle. Only obtainable from put or receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tracker {
    pub(crate) direction: Direction,
    pub(crate) seq: u64,
}

impl Tracker {
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// Delivery status code reported for a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Unknown = 0,
    Pending = 1,
    Accepted = 2,
    Rejected = 3,
    Released = 4,
    Modified = 5,
    Aborted = 6,
    Settled = 7,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_state(state: &DeliveryState) -> Self {
        match state {
            DeliveryState::Accepted => Status::Accepted,
            DeliveryState::Rejected { .. } => Status::Rejected,
            DeliveryState::Released => Status::Released,
            DeliveryState::Modified { .. } => Status::Modified,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub tracker: Tracker,
    pub link: LinkId,
    /// Wire id; assigned on transfer for outgoing deliveries.
    pub delivery_id: Option<u32>,
    /// Outgoing: payload until transferred. Incoming: payload until `get`.
    pub message: Option<Message>,
    pub local_state: Option<DeliveryState>,
    pub remote_state: Option<DeliveryState>,
    pub local_settled: bool,
    pub remote_settled: bool,
    /// Outgoing only: released for transfer by `send`.
    pub eligible: bool,
    pub sent: bool,
}

impl Delivery {
    fn new(tracker: Tracker, link: LinkId, message: Message) -> Self {
        Self {
            tracker,
            link,
            delivery_id: None,
            message: Some(message),
            local_state: None,
            remote_state: None,
            local_settled: false,
            remote_settled: false,
            eligible: false,
            sent: false,
        }
    }

    pub fn status(&self) -> Status {
        let state = match self.tracker.direction {
            Direction::Outgoing => self.remote_state.as_ref(),
            Direction::Incoming => self.local_state.as_ref(),
        };
        match state {
            Some(s) => Status::from_state(s),
            None if self.local_settled || self.remote_settled => Status::Settled,
            None => Status::Pending,
        }
    }

    pub fn remote_error(&self) -> Option<&ErrorCondition> {
        match &self.remote_state {
            Some(DeliveryState::Rejected { error }) => error.as_ref(),
            _ => None,
        }
    }

    /// Settled locally and no longer holding a payload.
    fn evictable(&self) -> bool {
        self.local_settled && self.message.is_none()
    }
}

/// Deliveries of one direction in tracker order, bounded by a window.
#[derive(Debug)]
pub(crate) struct DeliveryQueue {
    direction: Direction,
    next_seq: u64,
    window: usize,
    deliveries: VecDeque<Delivery>,
}

impl DeliveryQueue {
    pub fn new(direction: Direction, window: usize) -> Self {
        Self {
            direction,
            next_seq: 0,
            window,
            deliveries: VecDeque::new(),
        }
    }

    pub fn set_window(&mut self, window: usize) {
        self.window = window;
        self.evict();
    }

    pub fn push(&mut self, link: LinkId, message: Message) -> Tracker {
        let tracker = Tracker {
            direction: self.direction,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.deliveries.push_back(Delivery::new(tracker, link, message));
        self.evict();
        tracker
    }

    /// Drop the oldest settled deliveries while over the window.
    fn evict(&mut self) {
        while self.deliveries.len() > self.window {
            match self.deliveries.iter().position(Delivery::evictable) {
                Some(i) => {
                    self.deliveries.remove(i);
                }
                None => break,
            }
        }
    }

    fn index(&self, tracker: Tracker) -> Option<usize> {
        if tracker.direction != self.direction {
            return None;
        }
        self.deliveries
            .binary_search_by_key(&tracker.seq, |d| d.tracker.seq)
            .ok()
    }

    pub fn get(&self, tracker: Tracker) -> Option<&Delivery> {
        self.index(tracker).map(|i| &self.deliveries[i])
    }

    pub fn get_mut(&mut self, tracker: Tracker) -> Option<&mut Delivery> {
        self.index(tracker).map(move |i| &mut self.deliveries[i])
    }

    /// Call after settling; the delivery may now fall out of the window.
    pub fn settled(&mut self) {
        self.evict();
    }

    pub fn by_delivery_id_mut(&mut self, id: u32) -> Option<&mut Delivery> {
        self.deliveries
            .iter_mut()
            .find(|d| d.delivery_id == Some(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delivery> {
        self.deliveries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Delivery> {
        self.deliveries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }
}

//! Link (subscription / sender channel) model and the per-session link table.

use crate::protocol::{ExpiryPolicy, Frame, ReceiverSettleMode, Role, SenderSettleMode, Terminus};

/// Opaque link handle, valid until the link is reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) u64);

/// Endpoint state of one side of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointState {
    #[default]
    Uninit,
    Active,
    Closed,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub(crate) id: LinkId,
    /// Resolved terminus address; also the link name on the wire.
    pub(crate) name: String,
    pub(crate) role: Role,
    pub(crate) snd_settle_mode: SenderSettleMode,
    pub(crate) rcv_settle_mode: ReceiverSettleMode,
    pub(crate) source: Terminus,
    pub(crate) target: Terminus,
    pub(crate) remote_source: Option<Terminus>,
    pub(crate) local: EndpointState,
    pub(crate) remote: EndpointState,
    pub(crate) local_detached: bool,
    pub(crate) remote_detached: bool,
    /// Created in answer to a remote attach rather than by this side.
    pub(crate) remotely_initiated: bool,
    pub(crate) credit: u32,
    pub(crate) delivery_count: u32,
}

impl Link {
    pub(crate) fn new(id: LinkId, name: &str, role: Role) -> Self {
        Self {
            id,
            name: name.to_string(),
            role,
            snd_settle_mode: SenderSettleMode::default(),
            rcv_settle_mode: ReceiverSettleMode::default(),
            source: Terminus::new(name),
            target: Terminus::new(name),
            remote_source: None,
            local: EndpointState::Uninit,
            remote: EndpointState::Uninit,
            local_detached: false,
            remote_detached: false,
            remotely_initiated: false,
            credit: 0,
            delivery_count: 0,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_sender(&self) -> bool {
        self.role == Role::Sender
    }

    pub fn credit(&self) -> u32 {
        self.credit
    }

    pub fn remote_active(&self) -> bool {
        self.remote == EndpointState::Active && !self.remote_detached
    }

    pub fn remote_closed(&self) -> bool {
        self.remote == EndpointState::Closed
    }

    pub fn remote_detached(&self) -> bool {
        self.remote_detached
    }

    pub fn local_active(&self) -> bool {
        self.local == EndpointState::Active && !self.local_detached
    }

    pub fn locally_closed(&self) -> bool {
        self.local == EndpointState::Closed || self.local_detached
    }

    /// Both ends have closed or detached; nothing more will arrive for it.
    pub fn ended(&self) -> bool {
        self.locally_closed() && (self.remote_closed() || self.remote_detached)
    }

    pub fn remote_source_address(&self) -> Option<&str> {
        self.remote_source.as_ref().map(|t| t.address.as_str())
    }

    pub fn target(&self) -> &Terminus {
        &self.target
    }

    pub fn source(&self) -> &Terminus {
        &self.source
    }

    /// Set expiry policy and timeout on both termini.
    pub(crate) fn set_expiry(&mut self, policy: ExpiryPolicy, timeout: u32) {
        self.source.expiry_policy = policy;
        self.source.timeout = timeout;
        self.target.expiry_policy = policy;
        self.target.timeout = timeout;
    }

    /// Whether ending this link means a close (remote must confirm) rather than a bare detach.
    pub fn closes_on_end(&self) -> bool {
        !(self.target.expiry_policy == ExpiryPolicy::Never || self.target.timeout > 0)
    }

    pub(crate) fn attach_frame(&self) -> Frame {
        Frame::Attach {
            name: self.name.clone(),
            role: self.role,
            snd_settle_mode: self.snd_settle_mode,
            rcv_settle_mode: self.rcv_settle_mode,
            source: self.source.clone(),
            target: self.target.clone(),
        }
    }

    pub(crate) fn flow_frame(&self) -> Frame {
        Frame::Flow {
            name: self.name.clone(),
            delivery_count: self.delivery_count,
            link_credit: self.credit,
        }
    }
}

/// Arena of links keyed by [`LinkId`], in creation order.
#[derive(Debug, Default)]
pub(crate) struct LinkTable {
    next_id: u64,
    links: Vec<Link>,
}

impl LinkTable {
    pub fn create(&mut self, name: &str, role: Role) -> &mut Link {
        let id = LinkId(self.next_id);
        self.next_id += 1;
        self.links.push(Link::new(id, name, role));
        let last = self.links.len() - 1;
        &mut self.links[last]
    }

    pub fn get(&self, id: LinkId) -> Option<&Link> {
        self.links.iter().find(|l| l.id == id)
    }

    pub fn get_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.iter_mut().find(|l| l.id == id)
    }

    /// Newest link with this name and role that is still locally active.
    pub fn find_active(&self, name: &str, role: Role) -> Option<LinkId> {
        self.links
            .iter()
            .rev()
            .find(|l| l.name == name && l.role == role && l.local_active())
            .map(|l| l.id)
    }

    /// Newest link with this name and role in any state.
    pub fn find_any(&self, name: &str, role: Role) -> Option<LinkId> {
        self.links
            .iter()
            .rev()
            .find(|l| l.name == name && l.role == role)
            .map(|l| l.id)
    }

    /// Link the remote end is talking about: prefer one not yet remotely ended.
    pub fn find_for_remote(&self, name: &str, role: Role) -> Option<LinkId> {
        self.links
            .iter()
            .rev()
            .find(|l| {
                l.name == name && l.role == role && !l.remote_closed() && !l.remote_detached
            })
            .map(|l| l.id)
    }

    /// Remove the link. Returns false if it was already gone.
    pub fn remove(&mut self, id: LinkId) -> bool {
        let before = self.links.len();
        self.links.retain(|l| l.id != id);
        self.links.len() != before
    }

    /// Drop ended links with this name and role. Returns how many went.
    pub fn purge_ended(&mut self, name: &str, role: Role) -> usize {
        let before = self.links.len();
        self.links
            .retain(|l| !(l.name == name && l.role == role && l.ended()));
        before - self.links.len()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Link> {
        self.links.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_or_detach_decision() {
        let mut table = LinkTable::default();
        let link = table.create("q1", Role::Receiver);
        assert!(link.closes_on_end());
        link.set_expiry(ExpiryPolicy::Never, 0);
        assert!(!link.closes_on_end());
        link.set_expiry(ExpiryPolicy::LinkDetach, 30);
        assert!(!link.closes_on_end());
        link.set_expiry(ExpiryPolicy::LinkDetach, 0);
        assert!(link.closes_on_end());
    }

    #[test]
    fn find_active_skips_closed() {
        let mut table = LinkTable::default();
        let id = {
            let l = table.create("q1", Role::Receiver);
            l.local = EndpointState::Active;
            l.id
        };
        assert_eq!(table.find_active("q1", Role::Receiver), Some(id));
        assert_eq!(table.find_active("q1", Role::Sender), None);
        table.get_mut(id).unwrap().local = EndpointState::Closed;
        assert_eq!(table.find_active("q1", Role::Receiver), None);
        assert_eq!(table.find_any("q1", Role::Receiver), Some(id));
        assert!(table.remove(id));
        assert!(!table.remove(id));
    }

    #[test]
    fn purge_keeps_links_still_in_use() {
        let mut table = LinkTable::default();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let l = table.create("q1", Role::Receiver);
            l.local = EndpointState::Closed;
            ids.push(l.id);
        }
        table.get_mut(ids[0]).unwrap().remote = EndpointState::Closed;
        table.get_mut(ids[1]).unwrap().remote_detached = true;
        let other = table.create("q2", Role::Receiver);
        other.local = EndpointState::Closed;
        other.remote = EndpointState::Closed;

        assert_eq!(table.purge_ended("q1", Role::Receiver), 2);
        assert_eq!(table.len(), 2);
        assert_eq!(table.find_any("q1", Role::Receiver), Some(ids[2]));
    }
}

//! The shared delivery work queue.

use std::collections::VecDeque;

use parking_lot::Mutex;

use mg_keycard::WAddress;
use mg_store::ServerPath;

/// One queued message: the endpoints and where its sealed blob sits.
/// Carrying the sender alongside the blob path lets the worker bounce a
/// message whose blob has vanished from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub sender: WAddress,
    pub receiver: WAddress,
    pub path: ServerPath,
}

#[derive(Default)]
pub struct DeliveryQueue {
    items: Mutex<VecDeque<MessageInfo>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, msg: MessageInfo) {
        self.items.lock().push_back(msg);
    }

    /// Pop the oldest item; `None` tells a draining worker to exit.
    pub fn pop(&self) -> Option<MessageInfo> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        use mg_keycard::{Domain, RandomID};

        let q = DeliveryQueue::new();
        let domain: Domain = "example.com".parse().unwrap();
        let sender = WAddress::new(RandomID::generate(), domain.clone());
        let receiver = WAddress::new(RandomID::generate(), domain);
        let a = MessageInfo {
            sender: sender.clone(),
            receiver: receiver.clone(),
            path: "/ wsp a.msg".parse().unwrap(),
        };
        let b = MessageInfo {
            sender,
            receiver,
            path: "/ wsp b.msg".parse().unwrap(),
        };
        q.push(a.clone());
        q.push(b.clone());
        assert_eq!(q.pop(), Some(a));
        assert_eq!(q.pop(), Some(b));
        assert_eq!(q.pop(), None);
    }
}

use hashbrown::HashMap;

/// Correlation tag carried by a `.tag=` word.
pub type Tag = String;

/// Requests waiting for a reply, keyed by their correlation tag.
///
/// Tags are drawn from a counter scoped to the table and are checked against the tags
/// still pending, so a registration never shadows another one, even after the counter
/// wraps around.
#[derive(Debug)]
pub struct PendingRequests<H> {
    handlers: HashMap<Tag, H>,
    next_tag: u32,
}

impl<H> Default for PendingRequests<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> PendingRequests<H> {
    /// Creates an empty table. The first tag handed out is `1`.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            next_tag: 1,
        }
    }

    /// Registers `handler` under a fresh tag and returns the tag.
    pub fn register(&mut self, handler: H) -> Tag {
        let tag = loop {
            let candidate = self.next_tag.to_string();
            self.next_tag = self.next_tag.wrapping_add(1);
            if !self.handlers.contains_key(&candidate) {
                break candidate;
            }
        };
        self.handlers.insert(tag.clone(), handler);
        tag
    }

    /// Removes and returns the handler registered under `tag`.
    pub fn remove(&mut self, tag: &str) -> Option<H> {
        self.handlers.remove(tag)
    }

    /// Returns the handler registered under `tag`.
    pub fn get_mut(&mut self, tag: &str) -> Option<&mut H> {
        self.handlers.get_mut(tag)
    }

    /// Whether a handler is registered under `tag`.
    pub fn contains(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no request is pending.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Tags of the pending requests, in no particular order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Drops every registration without returning it.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

//! Address bar model. The history panel mirrors its search text into a
//! URL query parameter; this keeps a navigable stack of those URLs the
//! way a browser history would.

use std::sync::{Mutex, MutexGuard};

use url::Url;

struct BarInner {
    stack: Vec<Url>,
    /// Index of the current entry in `stack`.
    cursor: usize,
}

/// Navigable URL state with query-parameter editing.
pub struct AddressBar {
    inner: Mutex<BarInner>,
}

impl AddressBar {
    pub fn new(initial: Url) -> Self {
        Self {
            inner: Mutex::new(BarInner {
                stack: vec![initial],
                cursor: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BarInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current URL.
    pub fn current(&self) -> Url {
        let inner = self.lock();
        inner.stack[inner.cursor].clone()
    }

    /// Value of `name` in the current URL's query string, if present.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.current()
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Push a new entry whose query sets `name` to `value`. An empty value
    /// removes the parameter instead. Entries ahead of the cursor are
    /// discarded, as with a browser navigation after going back.
    pub fn set_query_param(&self, name: &str, value: &str) {
        let mut next = self.current();
        let retained: Vec<(String, String)> = next
            .query_pairs()
            .filter(|(key, _)| key != name)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        {
            let mut pairs = next.query_pairs_mut();
            pairs.clear();
            for (k, v) in &retained {
                pairs.append_pair(k, v);
            }
            if !value.is_empty() {
                pairs.append_pair(name, value);
            }
        }
        if next.query() == Some("") {
            next.set_query(None);
        }

        let mut inner = self.lock();
        let cursor = inner.cursor;
        inner.stack.truncate(cursor + 1);
        inner.stack.push(next);
        inner.cursor += 1;
    }

    /// Step back one entry. Returns the URL now current, or `None` at the
    /// start of the stack.
    pub fn back(&self) -> Option<Url> {
        let mut inner = self.lock();
        if inner.cursor == 0 {
            return None;
        }
        inner.cursor -= 1;
        Some(inner.stack[inner.cursor].clone())
    }

    /// Step forward one entry. Returns the URL now current, or `None` at
    /// the end of the stack.
    pub fn forward(&self) -> Option<Url> {
        let mut inner = self.lock();
        if inner.cursor + 1 >= inner.stack.len() {
            return None;
        }
        inner.cursor += 1;
        Some(inner.stack[inner.cursor].clone())
    }
}

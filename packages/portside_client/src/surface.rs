//! The panel surface: the seam between the sync core and whatever renders
//! the page. Mirrors the DOM contract of the rendered panel — a history
//! list container, a search field, and a heartbeat glyph — where each
//! element may be individually absent, in which case operations against it
//! are no-ops.

use std::sync::{Mutex, MutexGuard};

/// Write interface the sync core holds onto for the page's lifetime.
pub trait PanelSurface: Send + Sync + 'static {
    /// Replace the history list's content wholesale with a new fragment.
    fn replace_history_list(&self, fragment: &str);
    fn history_list_present(&self) -> bool;

    fn search_value(&self) -> String;
    fn set_search_value(&self, value: &str);
    fn search_present(&self) -> bool;
    /// Whether the search field holds native focus. While focused, the
    /// synthetic keystroke model trusts the field's own editing.
    fn search_focused(&self) -> bool;

    fn heart_present(&self) -> bool;
    fn set_heart_glyph(&self, glyph: &str);
    /// Cosmetic one-shot size pulse. Not state-affecting.
    fn pulse_heart(&self);
}

#[derive(Default)]
struct SearchField {
    value: String,
    focused: bool,
}

#[derive(Default)]
struct PageInner {
    list: Option<String>,
    search: Option<SearchField>,
    heart: Option<String>,
    pulses: u64,
}

/// In-memory page model implementing [`PanelSurface`]. Stands in for the
/// rendered document in the binary wiring and in tests.
pub struct PageModel {
    inner: Mutex<PageInner>,
}

impl Default for PageModel {
    fn default() -> Self {
        Self::new()
    }
}

impl PageModel {
    /// A page with every contract element present.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PageInner {
                list: Some(String::new()),
                search: Some(SearchField::default()),
                heart: Some("❤️".to_string()),
                pulses: 0,
            }),
        }
    }

    /// A page with none of the contract elements, for exercising the
    /// missing-element no-op rule.
    pub fn bare() -> Self {
        Self {
            inner: Mutex::new(PageInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PageInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn history_list(&self) -> Option<String> {
        self.lock().list.clone()
    }

    pub fn heart_glyph(&self) -> Option<String> {
        self.lock().heart.clone()
    }

    pub fn pulse_count(&self) -> u64 {
        self.lock().pulses
    }

    pub fn set_search_focused(&self, focused: bool) {
        if let Some(search) = self.lock().search.as_mut() {
            search.focused = focused;
        }
    }
}

impl PanelSurface for PageModel {
    fn replace_history_list(&self, fragment: &str) {
        if let Some(list) = self.lock().list.as_mut() {
            *list = fragment.to_string();
        }
    }

    fn history_list_present(&self) -> bool {
        self.lock().list.is_some()
    }

    fn search_value(&self) -> String {
        self.lock()
            .search
            .as_ref()
            .map(|s| s.value.clone())
            .unwrap_or_default()
    }

    fn set_search_value(&self, value: &str) {
        if let Some(search) = self.lock().search.as_mut() {
            search.value = value.to_string();
        }
    }

    fn search_present(&self) -> bool {
        self.lock().search.is_some()
    }

    fn search_focused(&self) -> bool {
        self.lock().search.as_ref().is_some_and(|s| s.focused)
    }

    fn heart_present(&self) -> bool {
        self.lock().heart.is_some()
    }

    fn set_heart_glyph(&self, glyph: &str) {
        if let Some(heart) = self.lock().heart.as_mut() {
            *heart = glyph.to_string();
        }
    }

    fn pulse_heart(&self) {
        let mut inner = self.lock();
        if inner.heart.is_some() {
            inner.pulses += 1;
        }
    }
}

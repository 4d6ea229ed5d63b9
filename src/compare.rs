//! In-memory selection for the side-by-side comparison view. Never
//! persisted; lives and dies with the page session.

/// Upper bound of the comparison table.
pub const MAX_COMPARE: usize = 4;

/// Listing snapshot carried into the comparison table.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonEntry {
    pub id: String,
    pub title: String,
    pub location: Option<String>,
    pub price: Option<String>,
    pub original_price: Option<String>,
    pub size_m2: Option<f32>,
    pub bedrooms: Option<u8>,
    pub bathrooms: Option<u8>,
    pub energy_label: Option<String>,
    pub features: Vec<String>,
    pub image_url: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
}

impl ComparisonEntry {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            location: None,
            price: None,
            original_price: None,
            size_m2: None,
            bedrooms: None,
            bathrooms: None,
            energy_label: None,
            features: Vec::new(),
            image_url: None,
            status: None,
            description: None,
        }
    }
}

/// Insertion-ordered selection capped at `MAX_COMPARE`. A fifth distinct
/// listing evicts the oldest entry (fixed-size FIFO, not LRU); re-adding a
/// selected listing replaces its snapshot in place without reordering.
#[derive(Debug, Default)]
pub struct ComparisonTray {
    entries: Vec<ComparisonEntry>,
    visible: bool,
}

impl ComparisonTray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: ComparisonEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.id == entry.id) {
            *existing = entry;
            return;
        }
        if self.entries.len() == MAX_COMPARE {
            self.entries.remove(0);
        }
        self.entries.push(entry);
    }

    pub fn remove(&mut self, id: &str) {
        self.entries.retain(|e| e.id != id);
        if self.entries.is_empty() {
            self.visible = false;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.visible = false;
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn entries(&self) -> &[ComparisonEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// No-op while nothing is selected.
    pub fn open(&mut self) {
        if !self.entries.is_empty() {
            self.visible = true;
        }
    }

    pub fn close(&mut self) {
        self.visible = false;
    }

    pub fn is_open(&self) -> bool {
        self.visible
    }
}

use casefile_core::ChunkMetadata;

/// Position of a chunk in the store. Shared by the vector and lexical indexes.
pub type ChunkId = usize;

/// Immutable, positionally addressed chunk texts with their metadata.
///
/// Texts and metadata live in two parallel arrays of equal length; chunk `i`
/// is paired with metadata `i`. A store is only ever produced by
/// [`ChunkStoreBuilder::finish`] or by loading a persisted index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkStore {
    texts: Vec<String>,
    metadata: Vec<ChunkMetadata>,
}

impl ChunkStore {
    /// Text and metadata of chunk `id`, or `None` if out of range.
    pub fn get(&self, id: ChunkId) -> Option<(&str, &ChunkMetadata)> {
        let text = self.texts.get(id)?;
        let meta = self.metadata.get(id)?;
        Some((text.as_str(), meta))
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Whether the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// All chunk texts in id order.
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// All metadata records in id order.
    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }

    /// Iterate `(id, text, metadata)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ChunkId, &str, &ChunkMetadata)> {
        self.texts
            .iter()
            .zip(self.metadata.iter())
            .enumerate()
            .map(|(id, (text, meta))| (id, text.as_str(), meta))
    }

    /// Rebuild a store from parallel arrays, as read back from disk.
    ///
    /// Returns `None` when the arrays differ in length.
    pub(crate) fn from_parts(texts: Vec<String>, metadata: Vec<ChunkMetadata>) -> Option<Self> {
        (texts.len() == metadata.len()).then_some(Self { texts, metadata })
    }
}

/// Write side of a [`ChunkStore`], used only while a build is collecting chunks.
#[derive(Debug, Default)]
pub struct ChunkStoreBuilder {
    inner: ChunkStore,
}

impl ChunkStoreBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return its id.
    pub fn append(&mut self, text: impl Into<String>, metadata: ChunkMetadata) -> ChunkId {
        let id = self.inner.texts.len();
        self.inner.texts.push(text.into());
        self.inner.metadata.push(metadata);
        id
    }

    /// Number of chunks appended so far.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Freeze the store.
    pub fn finish(self) -> ChunkStore {
        self.inner
    }
}

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::TripleServerError;
use crate::stream::{ServerStream, StreamId};

/// Tracks the server streams being served.
///
/// Only one stream per id may be active at a time. [`try_create`] returns a
/// handle that removes the stream and tears it down when dropped.
///
/// [`try_create`]: StreamMap::try_create
#[derive(Default)]
pub struct StreamMap {
    streams: DashMap<StreamId, Arc<ServerStream>, ahash::RandomState>,
}

impl StreamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register a stream unless one with `id` is already active.
    ///
    /// `make` only runs when the id is free.
    pub fn try_create(
        self: &Arc<Self>,
        id: StreamId,
        make: impl FnOnce() -> ServerStream,
    ) -> Result<ServerStreamHandle, TripleServerError> {
        match self.streams.entry(id) {
            Entry::Occupied(_) => Err(TripleServerError::StreamAlreadyActive(id)),
            Entry::Vacant(slot) => {
                let stream = Arc::new(make());
                slot.insert(Arc::clone(&stream));
                Ok(ServerStreamHandle {
                    stream,
                    map: Arc::clone(self),
                })
            }
        }
    }

    pub fn get(&self, id: StreamId) -> Option<Arc<ServerStream>> {
        self.streams.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.streams.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    fn remove(&self, id: StreamId) -> Option<Arc<ServerStream>> {
        self.streams.remove(&id).map(|(_, stream)| stream)
    }
}

impl fmt::Debug for StreamMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamMap")
            .field("len", &self.streams.len())
            .finish()
    }
}

/// An accepted stream. Dropping the handle closes the stream and forgets it.
pub struct ServerStreamHandle {
    stream: Arc<ServerStream>,
    map: Arc<StreamMap>,
}

impl ServerStreamHandle {
    pub fn stream(&self) -> &Arc<ServerStream> {
        &self.stream
    }
}

impl Deref for ServerStreamHandle {
    type Target = ServerStream;

    fn deref(&self) -> &ServerStream {
        &self.stream
    }
}

impl Drop for ServerStreamHandle {
    fn drop(&mut self) {
        self.map.remove(self.stream.id());
        self.stream.close();
    }
}

impl fmt::Debug for ServerStreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerStreamHandle")
            .field("stream_id", &self.stream.id())
            .finish()
    }
}

/// Lifecycle of a stream. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum StreamState {
    #[default]
    Open,
    HalfClosed,
    Closed,
}

impl StreamState {
    /// The state after one more end-of-stream event. `Closed` is terminal.
    pub fn on_end_stream(self) -> Self {
        match self {
            StreamState::Open => StreamState::HalfClosed,
            StreamState::HalfClosed | StreamState::Closed => StreamState::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only() {
        let state = StreamState::default();
        assert_eq!(state, StreamState::Open);
        let state = state.on_end_stream();
        assert_eq!(state, StreamState::HalfClosed);
        let state = state.on_end_stream();
        assert_eq!(state, StreamState::Closed);
        assert_eq!(state.on_end_stream(), StreamState::Closed);
    }
}

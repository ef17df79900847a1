//! Type-state markers for IMAP client connection states.

/// Marker type for the not-authenticated state.
///
/// In this state, only LOGIN is valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAuthenticated;

/// Marker type for the authenticated state.
///
/// In this state, SELECT and EXAMINE are valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

/// Marker type for the selected state.
///
/// In this state, SEARCH and FETCH are valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct Selected;

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_send<T: Send>() {}
    fn _assert_sync<T: Sync>() {}

    #[test]
    fn test_state_markers_are_send_sync() {
        _assert_send::<NotAuthenticated>();
        _assert_sync::<NotAuthenticated>();
        _assert_send::<Authenticated>();
        _assert_sync::<Authenticated>();
        _assert_send::<Selected>();
        _assert_sync::<Selected>();
    }
}

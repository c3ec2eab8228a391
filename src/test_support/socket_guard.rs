use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "PAPERBOT_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Starts a mock server, or returns `None` in sandboxes without loopback sockets.
///
/// # Panics
///
/// Panics instead of skipping when `PAPERBOT_REQUIRE_SOCKET_TESTS` is set (CI).
#[track_caller]
pub fn start_mock_server_or_skip() -> impl Future<Output = Option<MockServer>> {
    let bindable = TcpListener::bind("127.0.0.1:0").is_ok();
    let caller = Location::caller();
    if !bindable {
        let message = format!(
            "[socket-bound-test] {}:{} needs a loopback socket for the mock registry",
            caller.file(),
            caller.line()
        );
        assert!(!sockets_required(), "{message}; {REQUIRE_ENV} is set, refusing to skip");
        eprintln!("{message}; skipping (set {REQUIRE_ENV}=1 to fail instead)");
    }
    async move {
        if bindable {
            Some(MockServer::start().await)
        } else {
            None
        }
    }
}

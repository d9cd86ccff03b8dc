use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Process-wide HTTP client shared by every generation and embedding provider.
///
/// Providers add their auth headers per request. Embedding calls override the
/// timeout per request since they are much shorter than completions.
static SHARED_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(120))
        .build()
        .expect("Failed to create shared HTTP client")
});

/// Timeout applied to single embedding requests.
pub const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns a reference to the global shared HTTP client.
pub fn shared_client() -> &'static Client {
    &SHARED_CLIENT
}

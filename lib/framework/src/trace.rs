use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber.
///
/// `levels` uses the `EnvFilter` directive syntax, e.g. `info` or
/// `logsidecar_injector=debug,framework=info`. An invalid directive falls
/// back to `info`.
pub fn init(color: bool, json: bool, levels: &str) {
    let filter = EnvFilter::try_new(levels).unwrap_or_else(|err| {
        eprintln!("invalid log level directives {levels:?}, {err}");
        EnvFilter::new("info")
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(color)
                    .with_target(true),
            )
            .try_init()
    };

    if let Err(err) = result {
        // a global subscriber is already installed, tests do this a lot
        debug!(message = "tracing subscriber already initialized", %err);
    }
}

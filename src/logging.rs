use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
  let default_filter = if verbose {
    "flowroom=debug"
  } else {
    "flowroom=info"
  };
  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

  let fmt_layer = fmt::layer()
    .with_target(verbose)
    .with_line_number(verbose)
    .with_file(verbose)
    .with_writer(std::io::stderr);

  tracing_subscriber::registry()
    .with(env_filter)
    .with(fmt_layer)
    .init();
}

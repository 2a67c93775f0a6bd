//! Logging setup shared by the hygiene binaries, benches and tests.

/// Level used when `RUST_LOG` isn't set.
const DEFAULT_FILTER: &str = "info";

/// Log to stderr, honoring `RUST_LOG` and falling back to [DEFAULT_FILTER].
///
/// If called multiple times in the same process, only applies once.  Tests call this from every test function, so a
/// second logger being installed by someone else is not an error either.
pub fn log_to_stderr() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        let env = env_logger::Env::default().default_filter_or(DEFAULT_FILTER);
        let res = env_logger::Builder::from_env(env)
            .format(|buf, record| {
                use std::io::Write;

                let now = time::OffsetDateTime::now_utc();

                writeln!(
                    buf,
                    "{} {} time={} target={}",
                    record.level(),
                    record.args(),
                    now,
                    record.target()
                )
            })
            .try_init();

        if res.is_err() {
            log::debug!("A logger was already installed; keeping it");
        }
    });
}

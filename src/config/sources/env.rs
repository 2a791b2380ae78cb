//! Environment source: CAPES__RESOLVER__FRESHNESS_WINDOW_SECS=60 and friends

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment};

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("CAPES")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}

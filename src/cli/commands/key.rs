//! Key command - compute the cache key a layer would get

use crate::cache::{compute_key, CacheKey, KeyParent};
use crate::cli::args::KeyArgs;
use crate::cli::commands::read_script_arg;
use crate::config::Config;
use crate::error::{StrataError, StrataResult};
use crate::layer::LAYER_TEMPLATE;
use crate::orchestration::create_runtime;

/// Execute the key command
pub async fn execute(args: KeyArgs, config: &Config) -> StrataResult<()> {
    let script = read_script_arg(&args.script).await?;

    let parent_key = match args.parent {
        Some(ref raw) => Some(
            CacheKey::parse(raw)
                .ok_or_else(|| StrataError::User(format!("Not a cache key: {}", raw)))?,
        ),
        None => None,
    };
    let key = match parent_key {
        Some(ref parent) => compute_key(KeyParent::Layer(parent), &script, LAYER_TEMPLATE),
        None => {
            let base_id = match args.base_id {
                Some(id) => id,
                None => {
                    let runtime = create_runtime(config)?;
                    runtime.inspect_image(&config.runtime.base_image).await?.id
                }
            };
            compute_key(KeyParent::BaseImage(&base_id), &script, LAYER_TEMPLATE)
        }
    };

    println!("{}", key);
    println!("{}", key.image_tag(&config.runtime.namespace));
    Ok(())
}

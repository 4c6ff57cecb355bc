use crate::config::Config;

pub fn cmd_init() -> anyhow::Result<()> {
    if Config::create_default_if_missing()? {
        println!("Created config.toml with default settings");
        println!("Set places.api_key or export {}", crate::config::API_KEY_ENV);
    } else {
        println!("config.toml already exists, leaving it untouched");
    }
    Ok(())
}

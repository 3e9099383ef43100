//! `config` subcommands: path, show, check.

use fleetlens_config::{config_path, load_config, resolve_upstream};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(config_path);
            println!("{}", path.display());
            Ok(())
        }

        ConfigCommand::Show => {
            let config = load_config(global.config.as_ref())?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }

        ConfigCommand::Check => {
            let config = load_config(global.config.as_ref())?;

            for (name, upstream) in &config.upstreams {
                let (route, _) = resolve_upstream(name, upstream)?;
                println!(
                    "upstream '{name}': ok (source={}, policy={:?}, identity={})",
                    route.tag,
                    route.policy,
                    route.profile.identity_aliases.join(" > "),
                );
            }

            if config.upstreams.is_empty() {
                println!("no upstreams configured");
            }
            Ok(())
        }
    }
}

use std::path::Path;

pub fn cmd_config_show(explicit: Option<&Path>) -> anyhow::Result<i32> {
    let (cfg, path) = sentinel::config::load(explicit)?;
    match path {
        Some(p) => eprintln!("[sentinel] config file: {}", p.display()),
        None => eprintln!("[sentinel] no config file found, showing defaults"),
    }
    print!("{}", cfg.to_redacted_toml()?);
    Ok(0)
}

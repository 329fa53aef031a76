//! Configuration inspection commands.

use facetrain_core::FacetrainConfig;
use facetrain_core::collaborators::benchmark_path;

pub fn show_config(config: &FacetrainConfig) -> anyhow::Result<()> {
    print!("{}", render_config(config)?);
    Ok(())
}

fn render_config(config: &FacetrainConfig) -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

pub fn list_targets(config: &FacetrainConfig) -> anyhow::Result<()> {
    let rows = target_rows(config);
    if rows.is_empty() {
        println!("No verification targets configured.");
        return Ok(());
    }
    for (name, path, found) in rows {
        let status = if found { "found" } else { "missing" };
        println!("  {name:<16} {status:<8} {}", path.display());
    }
    Ok(())
}

fn target_rows(config: &FacetrainConfig) -> Vec<(String, std::path::PathBuf, bool)> {
    config
        .verification
        .targets
        .iter()
        .map(|name| {
            let path = benchmark_path(&config.verification.rec_prefix, name);
            let found = path.exists();
            (name.clone(), path, found)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_render_config_roundtrips() {
        let config = FacetrainConfig::default();
        let rendered = render_config(&config).unwrap();
        assert!(rendered.contains("[verification]"));
        let parsed: FacetrainConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_target_rows_report_presence() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lfw.bin"), b"").unwrap();
        let mut config = FacetrainConfig::default();
        config.verification.rec_prefix = dir.path().to_path_buf();
        config.verification.targets = vec!["lfw".into(), "cplfw".into()];

        let rows = target_rows(&config);
        let found: Vec<(&str, bool)> = rows.iter().map(|(n, _, f)| (n.as_str(), *f)).collect();
        assert_eq!(found, vec![("lfw", true), ("cplfw", false)]);
    }
}

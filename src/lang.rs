use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use tracing::debug;

use crate::request::Request;

/// Language range selection and key/value language packs.
///
/// Packs are flat YAML maps loaded per range; later loads merge over
/// earlier ones so app packs can override system packs.
#[derive(Default)]
pub struct Lang {
    range: RwLock<String>,
    packs: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl Lang {
    pub fn new(default: &str) -> Self {
        Lang {
            range: RwLock::new(default.to_lowercase()),
            packs: RwLock::default(),
        }
    }

    pub fn range(&self) -> String {
        self.range
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn set_range(&self, range: &str) {
        *self.range.write().unwrap_or_else(|p| p.into_inner()) = range.to_lowercase();
    }

    /// Detect the current language from the request: an explicit `lang`
    /// parameter wins, else the first `Accept-Language` tag. The detected
    /// range becomes current and is returned.
    pub fn detect(&self, req: &Request) -> String {
        if let Some(lang) = req.param("lang").and_then(|v| v.as_str().map(String::from)) {
            if !lang.is_empty() {
                self.set_range(&lang);
                return self.range();
            }
        }
        if let Some(accept) = req.header("accept-language") {
            let tag = accept
                .split(',')
                .next()
                .and_then(|part| part.split(';').next())
                .unwrap_or("")
                .trim();
            if !tag.is_empty() {
                self.set_range(tag);
            }
        }
        self.range()
    }

    /// Load language pack files into the current range; missing files are
    /// skipped, parse failures are reported.
    pub fn load(&self, files: &[std::path::PathBuf]) -> anyhow::Result<()> {
        let range = self.range();
        for file in files {
            if !file.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(file)?;
            let pack: HashMap<String, String> = serde_yaml::from_str(&content)?;
            debug!(range = %range, file = %file.display(), keys = pack.len(), "language pack loaded");
            self.packs
                .write()
                .unwrap_or_else(|p| p.into_inner())
                .entry(range.clone())
                .or_default()
                .extend(pack);
        }
        Ok(())
    }

    /// Look up a key in the current range's pack.
    pub fn get(&self, key: &str) -> Option<String> {
        self.packs
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&self.range())
            .and_then(|pack| pack.get(key).cloned())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Convenience used by the module language-pack lookup.
    pub(crate) fn pack_file(dir: &Path, range: &str) -> std::path::PathBuf {
        dir.join(format!("{}.yaml", range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_param_wins_over_header() {
        let lang = Lang::new("en-us");
        let mut req = Request::new("/");
        req.set_header("Accept-Language", "fr-FR,fr;q=0.9");
        req.set_param("lang", json!("zh-cn"));
        assert_eq!(lang.detect(&req), "zh-cn");
    }

    #[test]
    fn test_detect_from_header() {
        let lang = Lang::new("en-us");
        let mut req = Request::new("/");
        req.set_header("Accept-Language", "fr-FR,fr;q=0.9");
        assert_eq!(lang.detect(&req), "fr-fr");
    }
}

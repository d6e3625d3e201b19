use std::{collections::HashMap, fs};

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub socket_url: Option<String>,
    pub page_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:4000".into(),
            socket_url: None,
            page_size: 40,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("campuschat.toml") {
        apply_file_config(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("CAMPUSCHAT_API_URL") {
        settings.api_url = v;
    }
    if let Ok(v) = std::env::var("CAMPUSCHAT_SOCKET_URL") {
        settings.socket_url = Some(v);
    }
    if let Ok(v) = std::env::var("CAMPUSCHAT_PAGE_SIZE") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.page_size = parsed;
        }
    }

    settings
}

/// The socket connects to the API host unless a dedicated socket url is set.
pub fn socket_target(settings: &Settings) -> String {
    settings
        .socket_url
        .clone()
        .unwrap_or_else(|| settings.api_url.clone())
}

fn apply_file_config(settings: &mut Settings, raw: &str) {
    if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
        if let Some(v) = file_cfg.get("api_url") {
            settings.api_url = v.clone();
        }
        if let Some(v) = file_cfg.get("socket_url") {
            settings.socket_url = Some(v.clone());
        }
        if let Some(v) = file_cfg.get("page_size") {
            if let Ok(parsed) = v.parse::<u32>() {
                settings.page_size = parsed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_config_overrides_defaults() {
        let mut settings = Settings::default();
        apply_file_config(
            &mut settings,
            "api_url = \"https://chat.campus.edu\"\npage_size = \"25\"\n",
        );

        assert_eq!(settings.api_url, "https://chat.campus.edu");
        assert_eq!(settings.page_size, 25);
        assert_eq!(settings.socket_url, None);
    }

    #[test]
    fn unparseable_page_size_keeps_default() {
        let mut settings = Settings::default();
        apply_file_config(&mut settings, "page_size = \"lots\"\n");
        assert_eq!(settings.page_size, 40);
    }

    #[test]
    fn socket_target_falls_back_to_api_url() {
        let mut settings = Settings::default();
        assert_eq!(socket_target(&settings), settings.api_url);

        settings.socket_url = Some("ws://sockets.campus.edu".into());
        assert_eq!(socket_target(&settings), "ws://sockets.campus.edu");
    }
}

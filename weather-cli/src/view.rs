use chrono::Local;
use std::{fs, path::PathBuf};
use weather_core::WeatherView;

/// Prints the report as a small card on stdout; notices go to stderr.
#[derive(Debug, Default)]
pub struct TerminalView {
    city: String,
    temperature: String,
    condition: String,
    humidity: String,
    wind_speed: String,
    sunrise: String,
    icon_path: Option<PathBuf>,
    icon_saved: bool,
    dirty: bool,
}

impl TerminalView {
    pub fn new(icon_path: Option<PathBuf>) -> Self {
        Self { icon_path, ..Self::default() }
    }

    fn card(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n", self.city));
        out.push_str(&format!("  {}  {}\n", self.temperature, self.condition));
        out.push_str(&format!("  Humidity  {}\n", self.humidity));
        out.push_str(&format!("  Wind      {}\n", self.wind_speed));
        out.push_str(&format!("  Sunrise   {}", self.sunrise));
        out
    }
}

impl WeatherView for TerminalView {
    fn set_city(&mut self, text: &str) {
        self.city = text.to_string();
        self.dirty = true;
    }

    fn set_temperature(&mut self, text: &str) {
        self.temperature = text.to_string();
        self.dirty = true;
    }

    fn set_condition(&mut self, text: &str) {
        self.condition = text.to_string();
        self.dirty = true;
    }

    fn set_humidity(&mut self, text: &str) {
        self.humidity = text.to_string();
        self.dirty = true;
    }

    fn set_wind_speed(&mut self, text: &str) {
        self.wind_speed = text.to_string();
        self.dirty = true;
    }

    fn set_sunrise(&mut self, text: &str) {
        self.sunrise = text.to_string();
        self.dirty = true;
    }

    fn set_icon(&mut self, image: &[u8]) {
        let Some(path) = &self.icon_path else {
            return;
        };
        match fs::write(path, image) {
            Ok(()) => self.icon_saved = true,
            Err(e) => tracing::warn!(error = %e, path = %path.display(), "failed to save icon"),
        }
    }

    fn show_notice(&mut self, text: &str) {
        eprintln!("! {text}");
    }

    fn refresh(&mut self) {
        if self.dirty {
            self.dirty = false;
            println!("{}", self.card());
            println!("  (updated {})", Local::now().format("%H:%M"));
        }
        if self.icon_saved {
            self.icon_saved = false;
            if let Some(path) = &self.icon_path {
                println!("  Icon saved to {}", path.display());
            }
        }
    }
}

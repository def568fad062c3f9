use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;
use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// Human output is suppressed when `SAVEDQ_QUIET` is set; errors still print
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("SAVEDQ_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}

pub fn header(text: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::ROCKET, text.style(theme().heading.clone()));
}

pub fn banner(title: &str, subtitle: &str) {
    if is_quiet() {
        return;
    }
    println!();
    println!("{}", title.style(theme().heading.clone()));
    println!("{}", subtitle.style(theme().detail.clone()));
    println!();
}

pub fn success(label: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", Icons::CHECK, label.style(theme().ok.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().failure.clone()));
}

pub fn warn(label: &str) {
    if is_quiet() {
        return;
    }
    eprintln!("{} {}", Icons::WARN, label.style(theme().caution.clone()));
}

pub fn info(label: &str, value: &str) {
    if is_quiet() {
        return;
    }
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().label.clone()),
        label.style(theme().detail.clone()),
        value
    );
}

pub fn section(title: &str) {
    if is_quiet() {
        return;
    }
    println!();
    println!("━{}━", title.style(theme().heading.clone()));
}

pub fn dim(text: &str) -> String {
    text.style(theme().detail.clone()).to_string()
}

pub fn muted(text: &str) -> String {
    text.style(theme().count.clone()).to_string()
}

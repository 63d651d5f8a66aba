//! User-Agent selection for outgoing requests.
//!
//! When a request configures no User-Agent, one line is picked at random from
//! the configured word-list file, or a plausible desktop browser string is
//! synthesized.

use std::path::Path;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::GrabError;

const PLATFORMS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
];

/// Synthesizes a desktop browser User-Agent with randomized platform and version.
#[must_use]
pub fn generate_user_agent() -> String {
    let mut rng = rand::thread_rng();
    let platform = PLATFORMS.choose(&mut rng).copied().unwrap_or(PLATFORMS[0]);
    match rng.gen_range(0..3) {
        0 => {
            let version = rng.gen_range(115..=131);
            format!(
                "Mozilla/5.0 ({platform}; rv:{version}.0) Gecko/20100101 Firefox/{version}.0"
            )
        }
        1 => {
            let major = rng.gen_range(118..=131);
            let build = rng.gen_range(5000..=6800);
            format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/{major}.0.{build}.0 Safari/537.36 Edg/{major}.0.{build}.0"
            )
        }
        _ => {
            let major = rng.gen_range(118..=131);
            let build = rng.gen_range(5000..=6800);
            format!(
                "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/{major}.0.{build}.0 Safari/537.36"
            )
        }
    }
}

/// Picks a random non-empty line from a User-Agent word list.
///
/// # Errors
///
/// Returns [`GrabError::Io`] if the file cannot be read and
/// [`GrabError::Misuse`] if it holds no usable line.
pub fn user_agent_from_file(path: &Path) -> Result<String, GrabError> {
    let contents = std::fs::read_to_string(path).map_err(|e| GrabError::io(path, e))?;
    let lines: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines
        .choose(&mut rand::thread_rng())
        .map(|line| (*line).to_string())
        .ok_or_else(|| {
            GrabError::misuse(format!("user agent file {} is empty", path.display()))
        })
}

//! Project type and repository name derivation.

use std::sync::LazyLock;

use codegen::DEFAULT_PROJECT_TYPE;
use regex::Regex;

/// Board name used when none can be resolved.
pub const FALLBACK_BOARD_NAME: &str = "ai-board";

/// Project type for boards that look like games.
pub const GAME_PROJECT_TYPE: &str = "haxe-heaps";

static NON_ALNUM: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new("[^a-z0-9]+").ok());

/// Pick the project type for a card.
///
/// Order: explicit override, a `project:<type>` or `type:<type>` label,
/// a board name mentioning "game" or "haxe", then the default.
#[must_use]
pub fn project_type(override_type: Option<&str>, labels: &[String], board_name: &str) -> String {
    if let Some(forced) = override_type.map(str::trim).filter(|t| !t.is_empty()) {
        return forced.to_lowercase();
    }

    let from_label = labels.iter().find_map(|label| {
        let label = label.trim().to_lowercase();
        if !(label.starts_with("project:") || label.starts_with("type:")) {
            return None;
        }
        label
            .rsplit(':')
            .next()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    });
    if let Some(found) = from_label {
        return found;
    }

    let board = board_name.to_lowercase();
    if board.contains("game") || board.contains("haxe") {
        return GAME_PROJECT_TYPE.to_string();
    }

    DEFAULT_PROJECT_TYPE.to_string()
}

/// Repository name for a board and project type.
///
/// The board name is lowercased with every run of characters outside
/// `[a-z0-9]` collapsed to `-`. Haxe projects get a `haxe-` prefix and
/// backend projects an `api-` prefix.
#[must_use]
pub fn repository_name(board_name: &str, project_type: &str) -> String {
    let lower = board_name.to_lowercase();
    let collapsed = match NON_ALNUM.as_ref() {
        Some(re) => re.replace_all(&lower, "-").into_owned(),
        None => lower
            .chars()
            .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
            .collect(),
    };
    let slug = collapsed.trim_matches('-');
    let slug = if slug.is_empty() { "project" } else { slug };

    let prefix = if project_type.contains("haxe") {
        "haxe-"
    } else if project_type.contains("backend") {
        "api-"
    } else {
        ""
    };
    format!("{prefix}{slug}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_override_wins() {
        assert_eq!(
            project_type(Some(" Backend-Node "), &labels(&["type:haxe-heaps"]), "Game"),
            "backend-node"
        );
    }

    #[test]
    fn test_label_selects_type() {
        assert_eq!(
            project_type(None, &labels(&["urgent", "project:backend-node"]), "Space Game"),
            "backend-node"
        );
        assert_eq!(project_type(None, &labels(&["type:web-vite"]), "x"), "web-vite");
    }

    #[test]
    fn test_board_name_heuristic_and_default() {
        assert_eq!(project_type(None, &[], "Retro Game Jam"), "haxe-heaps");
        assert_eq!(project_type(None, &[], "HaxeFlixel port"), "haxe-heaps");
        assert_eq!(project_type(None, &[], "Marketing"), "web-vite");
        assert_eq!(project_type(Some("  "), &labels(&["project:"]), "Marketing"), "web-vite");
    }

    #[test]
    fn test_repository_name() {
        assert_eq!(repository_name("My Cool  Board!", "web-vite"), "my-cool-board");
        assert_eq!(repository_name("Space Game", "haxe-heaps"), "haxe-space-game");
        assert_eq!(repository_name("Orders", "backend-node"), "api-orders");
        assert_eq!(repository_name("--Доска--", "web-vite"), "project");
        assert_eq!(repository_name("", "backend-node"), "api-project");
    }
}

use std::collections::HashSet;

use crate::components::tools::Tool;

// ═══════════════════════════════════════════════════════════════════════════
// KEYBINDINGS SYSTEM
// ═══════════════════════════════════════════════════════════════════════════

/// Engine entry points reachable from the keyboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindableAction {
    Undo,
    Redo,
    ToolBrush,
    ToolEraser,
    ToolSelect,
    ToolFill,
    ToolHand,
}

impl BindableAction {
    pub fn all() -> &'static [BindableAction] {
        use BindableAction::*;
        &[Undo, Redo, ToolBrush, ToolEraser, ToolSelect, ToolFill, ToolHand]
    }

    /// Name used after `key.` in the settings file.
    pub fn config_name(&self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::ToolBrush => "tool_brush",
            Self::ToolEraser => "tool_eraser",
            Self::ToolSelect => "tool_select",
            Self::ToolFill => "tool_fill",
            Self::ToolHand => "tool_hand",
        }
    }

    pub fn from_config_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|a| a.config_name() == name.trim())
    }

    /// The tool this action switches to, if it is a tool shortcut.
    pub fn tool(&self) -> Option<Tool> {
        match self {
            Self::ToolBrush => Some(Tool::Brush),
            Self::ToolEraser => Some(Tool::Eraser),
            Self::ToolSelect => Some(Tool::Select),
            Self::ToolFill => Some(Tool::Fill),
            Self::ToolHand => Some(Tool::Hand),
            Self::Undo | Self::Redo => None,
        }
    }
}

/// Canonical lowercase key name: `ctrl` → `control`, `cmd`/`command` → `meta`,
/// `" "`/`spacebar` → `space`.
pub fn normalize_key(key: &str) -> String {
    if key == " " {
        return "space".to_string();
    }
    let k = key.trim().to_lowercase();
    match k.as_str() {
        "ctrl" => "control".to_string(),
        "cmd" | "command" => "meta".to_string(),
        "spacebar" => "space".to_string(),
        _ => k,
    }
}

/// A `+`-joined set of keys that must all be held, e.g. `Control+Shift+z`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyCombo {
    parts: Vec<String>,
}

impl KeyCombo {
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<String> = s
            .split('+')
            .map(normalize_key)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(Self { parts })
        }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn is_held(&self, pressed: &HashSet<String>) -> bool {
        self.parts.iter().all(|p| pressed.contains(p))
    }

    /// Display string with the modifier names capitalised, e.g. `Control+Shift+z`.
    pub fn display(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p.as_str() {
                "control" => "Control".to_string(),
                "shift" => "Shift".to_string(),
                "alt" => "Alt".to_string(),
                "meta" => "Meta".to_string(),
                _ => p.clone(),
            })
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// Key-combination dispatcher tracking the currently held keys.
///
/// Longer combos are tried first, so `Control+Shift+z` wins over `Control+z`
/// while both are held.
#[derive(Clone, Debug)]
pub struct Keymap {
    bindings: Vec<(KeyCombo, BindableAction)>,
    pressed: HashSet<String>,
}

impl Default for Keymap {
    fn default() -> Self {
        use BindableAction::*;
        let mut map = Self::empty();
        map.bind("Control+z", Undo);
        map.bind("Control+Shift+z", Redo);
        map.bind("Control+y", Redo);
        map.bind("Meta+z", Undo);
        map.bind("Meta+Shift+z", Redo);
        map.bind("h", ToolHand);
        map.bind("m", ToolSelect);
        map.bind("g", ToolFill);
        map.bind("e", ToolEraser);
        map.bind("b", ToolBrush);
        map
    }
}

impl Keymap {
    pub fn empty() -> Self {
        Self {
            bindings: Vec::new(),
            pressed: HashSet::new(),
        }
    }

    /// Add a binding. Returns `false` for an unparsable combo.
    pub fn bind(&mut self, combo: &str, action: BindableAction) -> bool {
        let Some(combo) = KeyCombo::parse(combo) else { return false };
        self.bindings.retain(|(c, _)| *c != combo);
        self.bindings.push((combo, action));
        // Stable: equal-length combos keep insertion order
        self.bindings.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        true
    }

    pub fn unbind_action(&mut self, action: BindableAction) {
        self.bindings.retain(|(_, a)| *a != action);
    }

    pub fn combos_for(&self, action: BindableAction) -> Vec<&KeyCombo> {
        self.bindings
            .iter()
            .filter(|(_, a)| *a == action)
            .map(|(c, _)| c)
            .collect()
    }

    /// Register a key press and return the action it triggers, if any.
    /// Auto-repeat presses are ignored entirely.
    pub fn key_down(&mut self, key: &str, repeat: bool) -> Option<BindableAction> {
        if repeat {
            return None;
        }
        self.pressed.insert(normalize_key(key));
        self.bindings
            .iter()
            .find(|(combo, _)| combo.is_held(&self.pressed))
            .map(|(_, action)| *action)
    }

    pub fn key_up(&mut self, key: &str) {
        self.pressed.remove(&normalize_key(key));
    }

    /// Focus lost: forget every held key.
    pub fn blur(&mut self) {
        self.pressed.clear();
    }

    pub fn is_pressed(&self, key: &str) -> bool {
        self.pressed.contains(&normalize_key(key))
    }

    /// `key.<action>=<combo>, <combo>` lines for the settings file.
    pub fn to_config_lines(&self) -> Vec<String> {
        BindableAction::all()
            .iter()
            .filter_map(|action| {
                let combos = self.combos_for(*action);
                if combos.is_empty() {
                    return None;
                }
                let list: Vec<String> = combos.iter().map(|c| c.display()).collect();
                Some(format!("key.{}={}", action.config_name(), list.join(", ")))
            })
            .collect()
    }

    /// Replace an action's bindings from one settings line. Returns `false`
    /// when the action name or every combo is invalid.
    pub fn load_config_line(&mut self, action_name: &str, combos: &str) -> bool {
        let Some(action) = BindableAction::from_config_name(action_name) else { return false };
        let parsed: Vec<&str> = combos
            .split(',')
            .map(str::trim)
            .filter(|c| KeyCombo::parse(c).is_some())
            .collect();
        if parsed.is_empty() {
            return false;
        }
        self.unbind_action(action);
        for combo in parsed {
            self.bind(combo, action);
        }
        true
    }
}

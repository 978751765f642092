//! Natural-language alias resolution.
//!
//! Callers name targets loosely ("mug", "bike", "my phone" minus the "my").
//! The alias table maps a normalized user term to the canonical detector
//! labels it may mean; one term can map to several labels and several terms
//! to one label. Unknown terms are not an error: they pass through and fall
//! back to plain substring matching in the selector.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

/// Built-in alias data: user term -> canonical class labels.
const BUILTIN_ALIASES: &[(&str, &[&str])] = &[
    // Electronics
    ("phone", &["cell phone"]),
    ("cellphone", &["cell phone"]),
    ("mobile", &["cell phone"]),
    ("smartphone", &["cell phone"]),
    ("iphone", &["cell phone"]),
    ("android", &["cell phone"]),
    ("remote", &["remote"]),
    ("controller", &["remote"]),
    ("gamepad", &["remote"]),
    ("joystick", &["remote"]),
    ("game controller", &["remote"]),
    ("xbox controller", &["remote"]),
    ("playstation controller", &["remote"]),
    ("tv", &["tv"]),
    ("television", &["tv"]),
    ("monitor", &["tv"]),
    ("screen", &["tv", "laptop"]),
    ("laptop", &["laptop"]),
    ("computer", &["laptop"]),
    ("notebook", &["laptop"]),
    ("macbook", &["laptop"]),
    ("keyboard", &["keyboard"]),
    ("mouse", &["mouse"]),
    // Drinkware
    ("cup", &["cup"]),
    ("mug", &["cup"]),
    ("glass", &["cup", "wine glass"]),
    ("bottle", &["bottle"]),
    ("water bottle", &["bottle"]),
    ("wine glass", &["wine glass"]),
    ("drink", &["cup", "bottle", "wine glass"]),
    // People
    ("face", &["person"]),
    ("head", &["person"]),
    ("me", &["person"]),
    ("myself", &["person"]),
    ("user", &["person"]),
    ("person", &["person"]),
    ("human", &["person"]),
    ("man", &["person"]),
    ("woman", &["person"]),
    ("guy", &["person"]),
    ("girl", &["person"]),
    // Furniture
    ("chair", &["chair"]),
    ("seat", &["chair"]),
    ("couch", &["couch"]),
    ("sofa", &["couch"]),
    ("bed", &["bed"]),
    ("table", &["dining table"]),
    ("desk", &["dining table"]),
    // Food
    ("apple", &["apple"]),
    ("banana", &["banana"]),
    ("orange", &["orange"]),
    ("pizza", &["pizza"]),
    ("donut", &["donut"]),
    ("doughnut", &["donut"]),
    ("cake", &["cake"]),
    ("sandwich", &["sandwich"]),
    ("hot dog", &["hot dog"]),
    ("hotdog", &["hot dog"]),
    ("carrot", &["carrot"]),
    ("broccoli", &["broccoli"]),
    ("bowl", &["bowl"]),
    (
        "food",
        &["pizza", "sandwich", "apple", "banana", "orange", "cake", "donut"],
    ),
    // Kitchen
    ("fork", &["fork"]),
    ("knife", &["knife"]),
    ("spoon", &["spoon"]),
    ("utensil", &["fork", "knife", "spoon"]),
    ("microwave", &["microwave"]),
    ("oven", &["oven"]),
    ("toaster", &["toaster"]),
    ("sink", &["sink"]),
    ("refrigerator", &["refrigerator"]),
    ("fridge", &["refrigerator"]),
    // Other objects
    ("book", &["book"]),
    ("clock", &["clock"]),
    ("watch", &["clock"]),
    ("vase", &["vase"]),
    ("scissors", &["scissors"]),
    ("teddy bear", &["teddy bear"]),
    ("teddy", &["teddy bear"]),
    ("stuffed animal", &["teddy bear"]),
    ("toothbrush", &["toothbrush"]),
    ("hair drier", &["hair drier"]),
    ("hairdryer", &["hair drier"]),
    ("backpack", &["backpack"]),
    ("bag", &["backpack", "handbag"]),
    ("handbag", &["handbag"]),
    ("purse", &["handbag"]),
    ("suitcase", &["suitcase"]),
    ("luggage", &["suitcase"]),
    ("umbrella", &["umbrella"]),
    ("tie", &["tie"]),
    ("necktie", &["tie"]),
    // Sports
    ("ball", &["sports ball"]),
    ("sports ball", &["sports ball"]),
    ("frisbee", &["frisbee"]),
    ("skateboard", &["skateboard"]),
    ("surfboard", &["surfboard"]),
    ("tennis racket", &["tennis racket"]),
    ("racket", &["tennis racket"]),
    ("baseball bat", &["baseball bat"]),
    ("bat", &["baseball bat"]),
    ("baseball glove", &["baseball glove"]),
    ("glove", &["baseball glove"]),
    ("skis", &["skis"]),
    ("snowboard", &["snowboard"]),
    ("kite", &["kite"]),
    // Vehicles
    ("car", &["car"]),
    ("automobile", &["car"]),
    ("vehicle", &["car", "truck", "bus", "motorcycle"]),
    ("truck", &["truck"]),
    ("bus", &["bus"]),
    ("motorcycle", &["motorcycle"]),
    ("motorbike", &["motorcycle"]),
    ("bike", &["bicycle", "motorcycle"]),
    ("bicycle", &["bicycle"]),
    ("boat", &["boat"]),
    ("ship", &["boat"]),
    ("airplane", &["airplane"]),
    ("plane", &["airplane"]),
    ("train", &["train"]),
    // Animals
    ("cat", &["cat"]),
    ("kitty", &["cat"]),
    ("dog", &["dog"]),
    ("puppy", &["dog"]),
    ("bird", &["bird"]),
    ("horse", &["horse"]),
    ("cow", &["cow"]),
    ("sheep", &["sheep"]),
    ("elephant", &["elephant"]),
    ("bear", &["bear"]),
    ("zebra", &["zebra"]),
    ("giraffe", &["giraffe"]),
    (
        "animal",
        &["cat", "dog", "bird", "horse", "cow", "sheep", "elephant", "bear"],
    ),
    // Plants
    ("plant", &["potted plant"]),
    ("potted plant", &["potted plant"]),
    ("flower", &["potted plant"]),
    // Misc
    ("bench", &["bench"]),
    ("toilet", &["toilet"]),
    ("fire hydrant", &["fire hydrant"]),
    ("hydrant", &["fire hydrant"]),
    ("stop sign", &["stop sign"]),
    ("traffic light", &["traffic light"]),
    ("parking meter", &["parking meter"]),
];

/// Immutable user-term -> canonical-label mapping, built once at startup.
pub struct AliasTable {
    map: HashMap<String, Vec<String>>,
}

impl AliasTable {
    /// The built-in table.
    pub fn builtin() -> Self {
        let map = BUILTIN_ALIASES
            .iter()
            .map(|(term, labels)| {
                (
                    (*term).to_string(),
                    labels.iter().map(|l| (*l).to_string()).collect(),
                )
            })
            .collect();
        Self { map }
    }

    /// Built-in table overlaid with entries from a JSON file of the shape
    /// `{"term": ["label", ...], ...}`. File entries replace built-in
    /// entries with the same key.
    pub fn with_overlay_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read alias file {}", path.display()))?;
        let overlay: HashMap<String, Vec<String>> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid alias file {}", path.display()))?;

        let mut table = Self::builtin();
        for (term, labels) in overlay {
            table.map.insert(normalize(&term), labels);
        }
        Ok(table)
    }

    /// Resolve a user-supplied term to its candidate class labels.
    ///
    /// The normalized term itself always leads the list, so an exact class
    /// name matches even when it is not an alias key; unknown terms resolve
    /// to just themselves.
    pub fn resolve(&self, term: &str) -> Vec<String> {
        let normalized = normalize(term);
        let mut candidates = vec![normalized.clone()];
        if let Some(labels) = self.map.get(&normalized) {
            for label in labels {
                if !candidates.contains(label) {
                    candidates.push(label.clone());
                }
            }
        }
        candidates
    }
}

/// Term normalization shared by the table and the selector: lowercase, trim.
pub fn normalize(term: &str) -> String {
    term.trim().to_lowercase()
}

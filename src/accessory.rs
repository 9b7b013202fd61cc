use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    strum_macros::Display,
)]
pub enum AccessoryCategory {
    Hat,
    Eyewear,
    Neckwear,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accessory {
    pub id: &'static str,
    pub name: &'static str,
    pub category: AccessoryCategory,
}

pub const ACCESSORIES: &[Accessory] = &[
    Accessory {
        id: "party-hat",
        name: "Party Hat",
        category: AccessoryCategory::Hat,
    },
    Accessory {
        id: "crown",
        name: "Golden Crown",
        category: AccessoryCategory::Hat,
    },
    Accessory {
        id: "star-glasses",
        name: "Star Glasses",
        category: AccessoryCategory::Eyewear,
    },
    Accessory {
        id: "rocket-goggles",
        name: "Rocket Goggles",
        category: AccessoryCategory::Eyewear,
    },
    Accessory {
        id: "cozy-scarf",
        name: "Cozy Scarf",
        category: AccessoryCategory::Neckwear,
    },
    Accessory {
        id: "bow-tie",
        name: "Bow Tie",
        category: AccessoryCategory::Neckwear,
    },
    Accessory {
        id: "rainbow-sky",
        name: "Rainbow Sky",
        category: AccessoryCategory::Background,
    },
];

pub fn find(id: &str) -> Option<&'static Accessory> {
    ACCESSORIES.iter().find(|a| a.id == id)
}

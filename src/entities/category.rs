use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Product family shared by products and reviews. Stored as its display name.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Debug, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(
    enum_name = "category_enum",
    db_type = "String(StringLen::N(100))",
    rs_type = "String"
)]
pub enum Category {
    #[sea_orm(string_value = "Laptops")]
    #[serde(rename = "Laptops")]
    Laptops,
    #[sea_orm(string_value = "Desktop/PCs")]
    #[serde(rename = "Desktop/PCs")]
    DesktopPcs,
    #[sea_orm(string_value = "Components")]
    #[serde(rename = "Components")]
    Components,
    #[sea_orm(string_value = "Accessories")]
    #[serde(rename = "Accessories")]
    Accessories,
    #[sea_orm(string_value = "Speakers")]
    #[serde(rename = "Speakers")]
    Speakers,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Laptops,
        Category::DesktopPcs,
        Category::Components,
        Category::Accessories,
        Category::Speakers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Laptops => "Laptops",
            Self::DesktopPcs => "Desktop/PCs",
            Self::Components => "Components",
            Self::Accessories => "Accessories",
            Self::Speakers => "Speakers",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Laptops" => Ok(Self::Laptops),
            "Desktop/PCs" => Ok(Self::DesktopPcs),
            "Components" => Ok(Self::Components),
            "Accessories" => Ok(Self::Accessories),
            "Speakers" => Ok(Self::Speakers),
            _ => Err(format!("Invalid category: {}", s)),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

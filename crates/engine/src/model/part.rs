use serde::{Deserialize, Deserializer, Serialize};

/// Inventory classification of a maintenance part.
///
/// Serialized by name. Older backend versions only understand the integer
/// code, so deserialization accepts either form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PartCategory {
    WearPart,
    SparePart,
    ConsumablePart,
    ToolPart,
}

impl PartCategory {
    pub const ALL: [PartCategory; 4] = [
        PartCategory::WearPart,
        PartCategory::SparePart,
        PartCategory::ConsumablePart,
        PartCategory::ToolPart,
    ];

    pub fn code(&self) -> u8 {
        match self {
            PartCategory::WearPart => 0,
            PartCategory::SparePart => 1,
            PartCategory::ConsumablePart => 2,
            PartCategory::ToolPart => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(PartCategory::WearPart),
            1 => Some(PartCategory::SparePart),
            2 => Some(PartCategory::ConsumablePart),
            3 => Some(PartCategory::ToolPart),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PartCategory::WearPart => "WearPart",
            PartCategory::SparePart => "SparePart",
            PartCategory::ConsumablePart => "ConsumablePart",
            PartCategory::ToolPart => "ToolPart",
        }
    }

    pub fn label_de(&self) -> &'static str {
        match self {
            PartCategory::WearPart => "Verschleißteil",
            PartCategory::SparePart => "Ersatzteil",
            PartCategory::ConsumablePart => "Verbrauchsmaterial",
            PartCategory::ToolPart => "Werkzeugteil",
        }
    }
}

impl std::str::FromStr for PartCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<i64>() {
            return PartCategory::from_code(code).ok_or_else(|| format!("unknown category code: {}", code));
        }
        PartCategory::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

impl<'de> Deserialize<'de> for PartCategory {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Code(i64),
            Name(String),
        }

        match Wire::deserialize(d)? {
            Wire::Code(code) => PartCategory::from_code(code)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown category code: {}", code))),
            Wire::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// How the category is put on the wire for a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryEncoding {
    Name,
    Code,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenancePart {
    pub id: i64,
    pub part_number: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: PartCategory,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub stock_quantity: i32,
}

/// Body for create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRequest {
    pub part_number: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: PartCategory,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    pub stock_quantity: i32,
}

impl PartRequest {
    pub fn to_wire(&self, encoding: CategoryEncoding) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if encoding == CategoryEncoding::Code {
            if let Some(obj) = value.as_object_mut() {
                obj.insert("category".into(), serde_json::json!(self.category.code()));
            }
        }
        value
    }
}

impl From<&MaintenancePart> for PartRequest {
    fn from(p: &MaintenancePart) -> Self {
        Self {
            part_number: p.part_number.clone(),
            name: p.name.clone(),
            description: p.description.clone(),
            category: p.category,
            price: p.price,
            manufacturer: p.manufacturer.clone(),
            stock_quantity: p.stock_quantity,
        }
    }
}

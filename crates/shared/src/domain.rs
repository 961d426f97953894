use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);
    };
}

id_newtype!(BusinessId);

/// One row of the business directory. `id` is server-assigned and is the
/// ordering key for every range query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Business {
    pub id: BusinessId,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

/// Closed set of columns a bulk update may touch. Keeping this an enum means
/// the column name reaching SQL is always one of these literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessField {
    Name,
    Address,
    City,
    State,
    Zip,
    Phone,
    Email,
}

impl BusinessField {
    pub const ALL: [BusinessField; 7] = [
        BusinessField::Name,
        BusinessField::Address,
        BusinessField::City,
        BusinessField::State,
        BusinessField::Zip,
        BusinessField::Phone,
        BusinessField::Email,
    ];

    pub fn column(self) -> &'static str {
        match self {
            BusinessField::Name => "name",
            BusinessField::Address => "address",
            BusinessField::City => "city",
            BusinessField::State => "state",
            BusinessField::Zip => "zip",
            BusinessField::Phone => "phone",
            BusinessField::Email => "email",
        }
    }
}

impl std::str::FromStr for BusinessField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BusinessField::ALL
            .into_iter()
            .find(|field| field.column() == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

impl std::fmt::Display for BusinessField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown business field '{0}'")]
pub struct UnknownField(pub String);

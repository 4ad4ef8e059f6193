use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Customer,
    Owner,
    Driver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Customer => "customer",
            Role::Owner => "owner",
            Role::Driver => "driver",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "customer" => Ok(Role::Customer),
            "owner" => Ok(Role::Owner),
            "driver" => Ok(Role::Driver),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

// Customer dari tabel users, beserta id partner di payment gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_number: Option<String>,
}

impl Customer {
    pub fn phone(&self) -> Option<&str> {
        self.phone_number.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|s| !s.trim().is_empty())
    }
}

// Request untuk customer baru dari form sewa tanpa login
#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub emergency_phone_number: Option<String>,
    #[serde(default)]
    pub id_cards: Vec<String>,
}

/// Who is asking, as established by the upstream auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub id: i64,
    pub role: Role,
}

/// Row visibility derived from a [`Viewer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Customer(i64),
    Owner(i64),
}

impl Viewer {
    pub fn scope(&self) -> Scope {
        match self.role {
            Role::Customer => Scope::Customer(self.id),
            Role::Owner => Scope::Owner(self.id),
            Role::Admin | Role::Driver => Scope::All,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

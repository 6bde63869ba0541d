use crate::error::{ClassroomError, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{10,15}$").expect("valid phone regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Student,
    Teacher,
    Admin,
    Instructor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Teacher => "TEACHER",
            Role::Admin => "ADMIN",
            Role::Instructor => "INSTRUCTOR",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "STUDENT" => Ok(Role::Student),
            "TEACHER" => Ok(Role::Teacher),
            "ADMIN" => Ok(Role::Admin),
            "INSTRUCTOR" => Ok(Role::Instructor),
            other => Err(ClassroomError::invalid("role", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub phone_number: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub is_staff: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merit_user_id: Option<String>,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.is_active && self.is_staff && self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub phone_number: String,
    pub full_name: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub is_staff: bool,
}

fn default_role() -> Role {
    Role::Student
}

impl NewUser {
    pub fn student(email: &str, phone_number: &str, full_name: &str) -> Self {
        Self {
            email: email.to_string(),
            phone_number: phone_number.to_string(),
            full_name: full_name.to_string(),
            role: Role::Student,
            is_staff: false,
        }
    }

    /// Normalizes email case and phone formatting, then checks required fields.
    pub fn validated(mut self) -> Result<Self> {
        self.email = self.email.trim().to_lowercase();
        self.full_name = self.full_name.trim().to_string();
        self.phone_number = normalize_phone(&self.phone_number)?;

        if self.email.is_empty() {
            return Err(ClassroomError::invalid("email", "The Email field must be set"));
        }
        if !EMAIL_RE.is_match(&self.email) {
            return Err(ClassroomError::invalid("email", "Enter a valid email address."));
        }
        if self.full_name.is_empty() {
            return Err(ClassroomError::invalid("full_name", "The Full name field must be set"));
        }
        Ok(self)
    }
}

/// Numbers without a country code are taken as Indian (+91).
pub fn normalize_phone(raw: &str) -> Result<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    if compact.is_empty() {
        return Err(ClassroomError::invalid("phone_number", "The Phone number field must be set"));
    }
    if !PHONE_RE.is_match(&compact) {
        return Err(ClassroomError::invalid("phone_number", "Enter a valid phone number."));
    }
    if compact.starts_with('+') {
        Ok(compact)
    } else if compact.len() == 10 {
        Ok(format!("+91{compact}"))
    } else {
        Ok(format!("+{compact}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpPurpose {
    Login,
    Signup,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::Signup => "signup",
        }
    }
}

impl FromStr for OtpPurpose {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "login" => Ok(OtpPurpose::Login),
            "signup" => Ok(OtpPurpose::Signup),
            other => Err(ClassroomError::invalid("purpose", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

/// Server-side record of an OTP sent to a user. The client only ever sees `token`.
#[derive(Debug, Clone)]
pub struct OtpChallenge {
    pub token: String,
    pub user_id: i64,
    pub secret: Vec<u8>,
    pub purpose: OtpPurpose,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("98765 43210").unwrap(), "+919876543210");
        assert_eq!(normalize_phone("+919876543210").unwrap(), "+919876543210");
        assert_eq!(normalize_phone("919876543210").unwrap(), "+919876543210");
        assert!(normalize_phone("12ab").is_err());
        assert!(normalize_phone("").is_err());
    }

    #[test]
    fn test_new_user_validation() {
        let user = NewUser::student(" Asha@Example.com ", "9876543210", " Asha ")
            .validated()
            .unwrap();
        assert_eq!(user.email, "asha@example.com");
        assert_eq!(user.full_name, "Asha");
        assert_eq!(user.phone_number, "+919876543210");

        let err = NewUser::student("not-an-email", "9876543210", "Asha")
            .validated()
            .unwrap_err();
        assert!(matches!(err, ClassroomError::Validation { ref field, .. } if field == "email"));
    }

    #[test]
    fn test_role_round_trip_and_admin_check() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("admin".parse::<Role>().is_err());

        let mut user = User {
            id: 1,
            email: "a@b.co".into(),
            phone_number: "+919876543210".into(),
            full_name: "A".into(),
            role: Role::Admin,
            is_active: true,
            is_staff: false,
            merit_user_id: None,
            date_joined: Utc::now(),
        };
        assert!(!user.is_admin());
        user.is_staff = true;
        assert!(user.is_admin());
    }
}

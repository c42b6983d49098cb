//! Registration fixtures.

use bdams_domain::user::{BloodType, Registration, Role};

pub const PASSWORD: &str = "hunter22";

pub fn donor(email: &str, blood_type: BloodType) -> Registration {
    Registration {
        email: email.to_owned(),
        password: PASSWORD.to_owned(),
        name: name_from(email),
        role: Role::Donor,
        blood_type: Some(blood_type),
        phone: Some("+977-9800000000".to_owned()),
    }
}

pub fn recipient(email: &str) -> Registration {
    Registration {
        email: email.to_owned(),
        password: PASSWORD.to_owned(),
        name: name_from(email),
        role: Role::Recipient,
        blood_type: None,
        phone: None,
    }
}

fn name_from(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let mut chars = local.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Test User".to_owned(),
    }
}

#![forbid(unsafe_code)]

const MAX_NAME_CHARS: usize = 128;
const MAX_EMAIL_LEN: usize = 254;
const MAX_EMAIL_LOCAL_LEN: usize = 64;

/// The person whose credential is being enrolled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registrant {
    name: String,
    email: String,
}

impl Registrant {
    pub fn try_new(
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, RegistrantError> {
        let name = name.into().trim().to_string();
        let email = email.into().trim().to_string();
        validate_name(&name)?;
        validate_email(&email)?;
        Ok(Self { name, email })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrantError {
    EmptyName,
    NameTooLong,
    NameContainsControl,
    EmptyEmail,
    EmailTooLong,
    EmailContainsWhitespace,
    EmailMissingAt,
    EmailMultipleAt,
    EmailInvalidLocalPart,
    EmailInvalidDomain,
}

impl RegistrantError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::EmptyName => "name must not be empty",
            Self::NameTooLong => "name is too long",
            Self::NameContainsControl => "name contains control characters",
            Self::EmptyEmail => "email must not be empty",
            Self::EmailTooLong => "email is too long",
            Self::EmailContainsWhitespace => "email must not contain whitespace",
            Self::EmailMissingAt => "email must contain '@'",
            Self::EmailMultipleAt => "email must contain a single '@'",
            Self::EmailInvalidLocalPart => "email local part is invalid",
            Self::EmailInvalidDomain => "email domain is invalid",
        }
    }
}

impl std::fmt::Display for RegistrantError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for RegistrantError {}

fn validate_name(value: &str) -> Result<(), RegistrantError> {
    if value.is_empty() {
        return Err(RegistrantError::EmptyName);
    }
    if value.chars().count() > MAX_NAME_CHARS {
        return Err(RegistrantError::NameTooLong);
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(RegistrantError::NameContainsControl);
    }
    Ok(())
}

fn validate_email(value: &str) -> Result<(), RegistrantError> {
    if value.is_empty() {
        return Err(RegistrantError::EmptyEmail);
    }
    if value.len() > MAX_EMAIL_LEN {
        return Err(RegistrantError::EmailTooLong);
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(RegistrantError::EmailContainsWhitespace);
    }

    let mut parts = value.split('@');
    let (Some(local), Some(domain)) = (parts.next(), parts.next()) else {
        return Err(RegistrantError::EmailMissingAt);
    };
    if parts.next().is_some() {
        return Err(RegistrantError::EmailMultipleAt);
    }

    if local.is_empty()
        || local.len() > MAX_EMAIL_LOCAL_LEN
        || local.starts_with('.')
        || local.ends_with('.')
        || local.contains("..")
    {
        return Err(RegistrantError::EmailInvalidLocalPart);
    }

    if !domain.contains('.') {
        return Err(RegistrantError::EmailInvalidDomain);
    }
    for label in domain.split('.') {
        let valid = !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(RegistrantError::EmailInvalidDomain);
        }
    }
    Ok(())
}

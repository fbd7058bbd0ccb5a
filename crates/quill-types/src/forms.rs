use serde::Deserialize;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 20;
pub const EMAIL_MAX: usize = 123;
pub const PASSWORD_MIN: usize = 8;
pub const TITLE_MAX: usize = 20;

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterForm {
    /// Trims the identifying fields in place and checks their shape.
    /// Uniqueness is checked against the database separately.
    pub fn normalize(&mut self) -> Result<(), &'static str> {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_string();

        let name_len = self.username.chars().count();
        if !(USERNAME_MIN..=USERNAME_MAX).contains(&name_len) {
            return Err("Username must be between 3 and 20 characters.");
        }
        if !self.email.contains('@') || self.email.chars().count() > EMAIL_MAX {
            return Err("Please enter a valid email address.");
        }
        if self.password.chars().count() < PASSWORD_MIN {
            return Err("Password must be at least 8 characters.");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

// -- Posts --

#[derive(Debug, Deserialize)]
pub struct PostForm {
    pub title: String,
    pub content: String,
}

impl PostForm {
    pub fn validate(&self) -> Result<(), &'static str> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err("Title cannot be empty.");
        }
        if title.chars().count() > TITLE_MAX {
            return Err("Title must be at most 20 characters.");
        }
        if self.content.trim().is_empty() {
            return Err("Content cannot be empty.");
        }
        Ok(())
    }
}

// -- Comments --

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    pub content: String,
}

impl CommentForm {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.content.trim().is_empty() {
            return Err("Comment cannot be empty.");
        }
        Ok(())
    }
}

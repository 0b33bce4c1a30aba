use reqwest::Client;
use serde::Serialize;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Clone)]
pub struct EmailClient {
    client: Client,
    api_key: String,
    from_email: String,
    from_name: String,
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: String,
    to: [&'a str; 1],
    subject: &'a str,
    html: String,
}

impl EmailClient {
    pub fn new(client: Client, api_key: &str, from_email: &str, from_name: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            from_email: from_email.to_string(),
            from_name: from_name.to_string(),
        }
    }

    pub async fn send_email(&self, to: &str, subject: &str, html: String) -> Result<(), String> {
        let request = ResendRequest {
            from: format!("{} <{}>", self.from_name, self.from_email),
            to: [to],
            subject,
            html,
        };

        let response = self.client
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("email send failed: {e}"))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("email API error: {body}"));
        }

        tracing::debug!(to = %to, subject = %subject, "email sent");
        Ok(())
    }

    pub async fn send_otp(&self, to: &str, code: &str, purpose: OtpPurpose) -> Result<(), String> {
        let (subject, heading) = match purpose {
            OtpPurpose::VerifyEmail => ("Verify your email", "Email Verification"),
            OtpPurpose::ResetPassword => ("Reset your password", "Password Reset"),
        };
        self.send_email(to, subject, otp_html(heading, code)).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    VerifyEmail,
    ResetPassword,
}

fn otp_html(heading: &str, code: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
        <h2 style="color: #f97316;">Courtside - {heading}</h2>
        <p>Your verification code is:</p>
        <div style="background: #111827; color: #f97316; font-size: 32px; font-weight: bold; text-align: center; padding: 20px; border-radius: 8px; letter-spacing: 8px;">{code}</div>
        <p style="color: #666; margin-top: 20px;">This code expires in 5 minutes. If you did not request it, ignore this email.</p>
        </div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_body_contains_code() {
        let html = otp_html("Password Reset", "042917");
        assert!(html.contains("042917"));
        assert!(html.contains("5 minutes"));
    }
}

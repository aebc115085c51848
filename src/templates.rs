//! HTML bodies for the emails this service writes itself.

use chrono::Utc;

use crate::{
    models::payment::PaymentEvent,
    utils::{escape_html, strip_html},
};

pub fn welcome(body: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
    <h1 style="color: #333;">Welcome!</h1>
    <p>Thanks for signing up to our service.</p>
    <p>{body}</p>
    <div style="background-color: #f5f5f5; padding: 15px; margin: 20px 0;">
        <p style="margin: 0;">We are excited to have you with us.</p>
    </div>
</div>"#
    )
}

pub fn welcome_text(body: &str) -> String {
    format!("Welcome! Thanks for signing up. {}", strip_html(body))
}

pub fn payment_confirmation_subject(order_id: &str) -> String {
    format!("Payment confirmed - Order #{}", order_id)
}

pub fn payment_confirmation(event: &PaymentEvent) -> String {
    let order_id = escape_html(&event.order_id);
    let amount = format!("{:.2}", event.amount.unwrap_or(0.0));
    let date = Utc::now().format("%Y-%m-%d");

    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
    <h1 style="color: #333;">Payment confirmed</h1>
    <p>Hello,</p>
    <p>Your payment for <strong>Order #{order_id}</strong> has been processed.</p>
    <div style="background-color: #f5f5f5; padding: 15px; margin: 20px 0; border-radius: 5px;">
        <h3 style="margin-top: 0; color: #2c5aa0;">Order summary</h3>
        <p><strong>Order number:</strong> #{order_id}</p>
        <p><strong>Status:</strong> Paid</p>
        <p><strong>Amount:</strong> ${amount}</p>
        <p><strong>Date:</strong> {date}</p>
    </div>
    <p>Your order is being prepared and we will let you know when it ships.</p>
    <p>Thank you for your purchase!</p>
</div>"#
    )
}

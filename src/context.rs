use std::sync::Arc;

use anyhow::{Error, Result};

use crate::{
    clients::{
        mailer::{MailSender, SmtpMailSender},
        orders::{HttpOrderServiceClient, OrderStatusClient},
    },
    config::Config,
    consumers::{email::EmailConsumer, payment::PaymentOrchestrator},
    dispatcher::EmailDispatcher,
    models::credential::BearerCredential,
};

/// Everything the consumers and the HTTP surface share, built once at startup.
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Arc<Config>,
    pub credential: Option<BearerCredential>,
    pub mailer: Arc<dyn MailSender>,
    pub orders: Arc<dyn OrderStatusClient>,
    pub dispatcher: Arc<EmailDispatcher>,
}

impl ServiceContext {
    pub fn from_config(config: Config) -> Result<Self, Error> {
        let credential = config.jwt_token.clone().and_then(BearerCredential::new);
        let mailer: Arc<dyn MailSender> = Arc::new(SmtpMailSender::new(&config)?);
        let orders: Arc<dyn OrderStatusClient> =
            Arc::new(HttpOrderServiceClient::new(&config, credential.clone())?);

        Ok(Self::assemble(config, credential, mailer, orders))
    }

    pub fn with_collaborators(
        config: Config,
        mailer: Arc<dyn MailSender>,
        orders: Arc<dyn OrderStatusClient>,
    ) -> Self {
        let credential = config.jwt_token.clone().and_then(BearerCredential::new);
        Self::assemble(config, credential, mailer, orders)
    }

    fn assemble(
        config: Config,
        credential: Option<BearerCredential>,
        mailer: Arc<dyn MailSender>,
        orders: Arc<dyn OrderStatusClient>,
    ) -> Self {
        let dispatcher = Arc::new(EmailDispatcher::new(Arc::clone(&mailer), config.sender_name()));

        Self {
            config: Arc::new(config),
            credential,
            mailer,
            orders,
            dispatcher,
        }
    }

    pub fn email_consumer(&self) -> EmailConsumer {
        EmailConsumer::new(
            self.config.emails_queue.clone(),
            Arc::clone(&self.dispatcher),
            self.config.max_delivery_attempts,
        )
    }

    pub fn payment_orchestrator(&self) -> PaymentOrchestrator {
        PaymentOrchestrator::new(
            self.config.payment_queue.clone(),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.orders),
            self.credential.clone(),
            self.config.order_paid_status.clone(),
        )
    }
}

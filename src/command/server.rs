use crate::adapter::server::{InsecureListener, TlsListener};
use crate::adapter::Adapter;
use crate::configuration::Configuration;
use crate::{command, configuration};
use argh::FromArgs;
use std::sync::Arc;

pub enum ServiceListener {
    Insecure(InsecureListener),
    Secure(TlsListener),
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "serve",
    description = "Run the adapter listener"
)]
pub struct Options {}

pub struct Command {
    listener: ServiceListener,
}

impl Command {
    pub fn new(config: &Configuration) -> Result<Command, configuration::Error> {
        let adapter = Arc::new(Adapter::new(config)?);

        let listener = if config.server.tls.is_some() {
            ServiceListener::Secure(TlsListener::new(&config.server, adapter)?)
        } else {
            ServiceListener::Insecure(InsecureListener::new(&config.server, adapter))
        };

        Ok(Command { listener })
    }

    pub async fn run(&self) -> Result<(), command::Error> {
        match &self.listener {
            ServiceListener::Insecure(listener) => listener.serve().await?,
            ServiceListener::Secure(listener) => listener.serve().await?,
        }

        Ok(())
    }
}

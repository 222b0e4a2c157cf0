// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use lossbench::{channel, Registry, Responder, Result};
use structopt::StructOpt;
use tokio::{net::TcpListener, spawn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    lossbench_driver::init_tracing();
    Server::from_args().run().await
}

#[derive(Debug, StructOpt)]
pub struct Server {
    #[structopt(flatten)]
    opts: lossbench_driver::Server,
}

impl Server {
    pub async fn run(&self) -> Result<()> {
        let registry = Registry::new(self.opts.config()?)?;
        let _sweeper = registry.spawn_sweeper();
        let responder = Responder::new(registry);

        let server = self.server().await?;
        tracing::info!(addr = %server.local_addr()?, "listening");

        loop {
            let (connection, addr) = server.accept().await?;

            if !self.opts.nagle {
                let _ = connection.set_nodelay(true);
            }

            tracing::debug!(%addr, "accepted connection");

            let responder = responder.clone();
            spawn(async move {
                responder.serve(channel::tcp(connection)).await;
                tracing::debug!(%addr, "connection closed");
            });
        }
    }

    async fn server(&self) -> Result<TcpListener> {
        let server = TcpListener::bind((self.opts.ip, self.opts.port)).await?;
        Ok(server)
    }
}

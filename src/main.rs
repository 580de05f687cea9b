// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use metrics_rollup::command::Command;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Command::parse().execute().await
}

// SPDX-License-Identifier: Apache-2.0

pub mod kafka_exporter;
pub mod retry;

mod parse;

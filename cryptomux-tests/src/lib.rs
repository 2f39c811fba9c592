// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod harness;
pub mod run_cryptomuxd;
pub mod test_log;

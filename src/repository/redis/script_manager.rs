// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use redis::Script;

const PENDING_ADD_SCRIPT: &str = include_str!("lua_scripts/pending_add.lua");

pub struct ScriptManager;

impl ScriptManager {
    pub fn pending_add_script() -> &'static Script {
        static SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(PENDING_ADD_SCRIPT));
        Lazy::force(&SCRIPT)
    }
}

// uscheme: featherweight embeddable scheme interpreter.
//
// Copyright (C) 2020  the uscheme authors
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

use std::env::args;

use uscheme::config::{self, Config};
use uscheme::Interp;

fn main() {
    pretty_env_logger::init();

    let mut config = Config::default();
    let mut scripts = Vec::new();

    let mut argv = args().skip(1);
    while let Some(arg) = argv.next() {
        if arg == "--config" {
            let path = argv.next().expect("--config needs a file argument");
            config = config::load(&path).expect("couldn't load config");
        } else {
            scripts.push(arg);
        }
    }

    let mut scm = Interp::with_config(config);

    if scripts.is_empty() {
        scm.repl(None);
    } else {
        for path in scripts {
            if let Err(e) = scm.load(&path, None) {
                eprintln!("{}", e);
            }
        }
    }
}

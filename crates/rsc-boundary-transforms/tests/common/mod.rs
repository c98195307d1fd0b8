#![allow(dead_code)]

use std::path::Path;

use rsc_boundary_transforms::{Caller, Platform};
use swc_core::{
    common::{FileName, GLOBALS, Globals, SourceMap, comments::SingleThreadedComments, sync::Lrc},
    ecma::{
        ast::{EsVersion, Program},
        codegen::{Emitter, text_writer::JsWriter},
        parser::{EsSyntax, Parser, StringInput, Syntax, lexer::Lexer},
    },
};

/// Fixtures are compiled as if they lived at the root of this project.
pub const PROJECT_ROOT: &str = "/app";

/// Builds the caller from the fixture's directory names.
pub fn caller_for(input: &Path) -> Caller {
    let has = |name: &str| input.iter().any(|c| c.to_str() == Some(name));

    let platform = if has("ios") {
        Platform::Ios
    } else if has("android") {
        Platform::Android
    } else {
        Platform::Web
    };

    Caller {
        platform,
        is_dev: has("dev"),
        is_server: has("react-server") || has("ssr"),
        is_react_server: has("react-server"),
        is_node_module: false,
        supports_static_esm: has("esm"),
        project_root: Some(PROJECT_ROOT.into()),
    }
}

/// Re-parses and re-prints `code` so the emitted output and the expected
/// file go through the same printer.
pub fn print(code: &str) -> String {
    GLOBALS.set(&Globals::new(), || {
        let cm: Lrc<SourceMap> = Default::default();
        let comments = SingleThreadedComments::default();
        let fm = cm.new_source_file(Lrc::new(FileName::Anon), code.to_string());

        let lexer = Lexer::new(
            Syntax::Es(EsSyntax {
                jsx: true,
                ..Default::default()
            }),
            EsVersion::latest(),
            StringInput::from(&*fm),
            Some(&comments),
        );
        let module = Parser::new_from(lexer)
            .parse_module()
            .unwrap_or_else(|err| panic!("failed to parse:\n{code}\n{err:?}"));

        let mut output = vec![];
        {
            let mut emitter = Emitter {
                cfg: Default::default(),
                cm: cm.clone(),
                comments: Some(&comments),
                wr: JsWriter::new(cm.clone(), "\n", &mut output, None),
            };
            emitter
                .emit_program(&Program::Module(module))
                .expect("failed to print");
        }
        String::from_utf8(output).expect("printed code is not UTF-8")
    })
}

use std::collections::HashSet;

use proc_macro2::{Span, TokenStream};
use syn::parse::{Error, Result};
use syn::{Expr, Ident, Item, LitStr, Path};

use sourcer_core::{summarize, HostFunctions, Summary};

use crate::decl::*;

/// Everything declared in one `grammar!` invocation.
pub struct GrammarModule {
    module: Option<Ident>,
    grammar: Option<LitStr>,
    extends: Option<Path>,
    includes: Vec<Item>,
    hosts: Vec<(HostName, TokenStream)>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, span: Span, what: &str) -> Result<()> {
    if slot.is_some() {
        return Err(Error::new(span, format!("{} already defined", what)));
    }
    *slot = Some(value);
    Ok(())
}

/// Snippets that look like functions become callables, anything else a
/// plain value converted with `Value::from`.
fn snippet_value(expr: &Expr) -> TokenStream {
    match expr {
        Expr::Closure(_) | Expr::Path(_) => quote!(::sourcer::Value::func(#expr)),
        _ => quote!(::sourcer::Value::from(#expr)),
    }
}

/// `path` as seen from inside the generated module.
fn relative_to_module(path: &Path) -> TokenStream {
    if path.leading_colon.is_some() {
        return quote!(#path);
    }
    match path.segments.first() {
        Some(first) if first.ident == "crate" => quote!(#path),
        Some(first) if first.ident == "self" => {
            let rest = path.segments.iter().skip(1);
            quote!(super #(::#rest)*)
        }
        _ => quote!(super::#path),
    }
}

impl GrammarModule {
    pub fn new_from_decls(decls: Vec<Decl>) -> Result<GrammarModule> {
        let mut module = GrammarModule {
            module: None,
            grammar: None,
            extends: None,
            includes: Vec::new(),
            hosts: Vec::new(),
        };
        let mut seen = HashSet::new();
        for decl in decls {
            match decl {
                Decl::Module(ident) => {
                    let span = ident.span();
                    set_once(&mut module.module, ident, span, "Module name")?;
                }
                Decl::Grammar(lit) => {
                    let span = lit.span();
                    set_once(&mut module.grammar, lit, span, "Grammar")?;
                }
                Decl::Extends(path) => {
                    let span = path.segments.first().map_or_else(Span::call_site, |s| s.ident.span());
                    set_once(&mut module.extends, path, span, "Parent grammar")?;
                }
                Decl::Include(items) => module.includes.extend(items),
                Decl::Host(name, expr) => module.add_host(&mut seen, name, quote!(::sourcer::Value::func(#expr)))?,
                Decl::Const(name, expr) => module.add_host(&mut seen, name, quote!(::sourcer::Value::from(#expr)))?,
            }
        }
        Ok(module)
    }

    fn add_host(&mut self, seen: &mut HashSet<String>, name: HostName, value: TokenStream) -> Result<()> {
        if !seen.insert(name.text.clone()) {
            return Err(Error::new(name.span, format!("Host value `{}` already defined", name.text)));
        }
        self.hosts.push((name, value));
        Ok(())
    }

    fn check(&self, lit: &LitStr) -> Result<Summary> {
        let summary = summarize(&lit.value(), self.extends.is_some()).map_err(|e| Error::new(lit.span(), e.to_string()))?;
        if let (Some(parent), None) = (&summary.extends, &self.extends) {
            return Err(Error::new(
                lit.span(),
                format!("The grammar extends `{}`: declare its module with %extends", parent),
            ));
        }
        Ok(summary)
    }

    /// Registrations for the snippets and bound names of the grammar that
    /// were not declared explicitly. Their text is the Rust expression.
    fn implicit_hosts(&self, lit: &LitStr, summary: &Summary) -> Result<Vec<(String, TokenStream)>> {
        let builtins = HostFunctions::new();
        let mut declared: HashSet<&str> = self.hosts.iter().map(|(name, _)| name.text.as_str()).collect();
        let mut hosts = Vec::new();
        let used = summary
            .snippets
            .iter()
            .map(|s| (s, true))
            .chain(summary.bound_names.iter().map(|s| (s, false)));
        for (text, is_snippet) in used {
            if builtins.contains(text) || !declared.insert(text.as_str()) {
                continue;
            }
            let expr = syn::parse_str::<Expr>(text).map_err(|e| {
                Error::new(lit.span(), format!("Host snippet `{}` is not a Rust expression: {}", text, e))
            })?;
            let value = if is_snippet {
                snippet_value(&expr)
            } else {
                quote!(::sourcer::Value::from(#expr))
            };
            hosts.push((text.clone(), value));
        }
        Ok(hosts)
    }

    fn host_sections(&self, lit: &LitStr, summary: &Summary) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for section in &summary.host_sections {
            let file = syn::parse_str::<syn::File>(section)
                .map_err(|e| Error::new(lit.span(), format!("Invalid host section: {}", e)))?;
            items.extend(file.items);
        }
        Ok(items)
    }

    pub fn build(self) -> Result<TokenStream> {
        let lit = match &self.grammar {
            Some(lit) => lit.clone(),
            None => return Err(Error::new(Span::call_site(), "Missing %grammar declaration")),
        };
        let summary = self.check(&lit)?;
        let implicit = self.implicit_hosts(&lit, &summary)?;
        let sections = self.host_sections(&lit, &summary)?;

        let module = self.module.clone().unwrap_or_else(|| Ident::new("grammar", Span::call_site()));
        let includes = &self.includes;

        let host_names = self
            .hosts
            .iter()
            .map(|(name, _)| name.text.clone())
            .chain(implicit.iter().map(|(name, _)| name.clone()));
        let host_values = self
            .hosts
            .iter()
            .map(|(_, value)| value)
            .chain(implicit.iter().map(|(_, value)| value));

        let extends = self.extends.as_ref().map(|path| {
            let path = relative_to_module(path);
            quote!(.extends(#path::engine()))
        });

        let rule_fns = summary.rules.iter().map(|rule| {
            let name = Ident::new(&format!("parse_{}", rule), lit.span());
            quote! {
                #[allow(non_snake_case)]
                pub fn #name(text: &str) -> ::std::result::Result<::sourcer::Value, ::sourcer::InputError> {
                    super::engine()
                        .rule(#rule)
                        .expect("rule generated from the grammar")
                        .parse(text)
                }
            }
        });

        let expanded = quote! {
            pub mod #module {
                #![allow(dead_code, unused_imports)]
                use super::*;

                #(#includes)*
                #(#sections)*

                pub const GRAMMAR: &str = #lit;

                pub fn engine() -> &'static ::sourcer::Engine {
                    static ENGINE: ::std::sync::OnceLock<::sourcer::Engine> = ::std::sync::OnceLock::new();
                    ENGINE.get_or_init(|| {
                        let generated = ::sourcer::Generator::new()
                            #(.host(#host_names, #host_values))*
                            #extends
                            .generate(GRAMMAR);
                        match generated {
                            Ok(engine) => engine,
                            Err(e) => panic!("invalid grammar: {}", e),
                        }
                    })
                }

                pub fn parse(text: &str) -> ::std::result::Result<::sourcer::Value, ::sourcer::InputError> {
                    engine().parse(text)
                }

                pub fn parse_with<'a>(
                    input: impl ::std::convert::Into<::sourcer::Input<'a>>,
                    options: ::sourcer::ParseOptions,
                ) -> ::std::result::Result<::sourcer::Parsed, ::sourcer::InputError> {
                    engine().parse_with(input, options)
                }

                pub mod rules {
                    #(#rule_fns)*
                }
            }
        };
        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decls(tokens: TokenStream) -> Vec<Decl> {
        let crate::Decls(decls) = syn::parse2(tokens).unwrap();
        decls
    }

    #[test]
    fn declarations_are_parsed() {
        let decls = decls(quote! {
            %module calc;
            %grammar "start = /[0-9]+/ |> `int`";
            %host "twice" = |v| v;
            %const max = 3;
            %extends base;
            %include { fn helper() {} }
        });
        assert_eq!(decls.len(), 6);
        assert!(matches!(&decls[2], Decl::Host(name, _) if name.text == "twice"));
        assert!(matches!(&decls[3], Decl::Const(name, _) if name.text == "max"));
    }

    #[test]
    fn duplicated_declarations_fail() {
        let err = GrammarModule::new_from_decls(decls(quote! {
            %module a;
            %module b;
        }))
        .err()
        .unwrap();
        assert_eq!(err.to_string(), "Module name already defined");
        let err = GrammarModule::new_from_decls(decls(quote! {
            %const n = 1;
            %host n = f;
        }))
        .err()
        .unwrap();
        assert_eq!(err.to_string(), "Host value `n` already defined");
    }

    #[test]
    fn grammar_errors_become_compile_errors() {
        let module = GrammarModule::new_from_decls(decls(quote! {
            %grammar "start = Missing";
        }))
        .unwrap();
        let err = module.build().err().unwrap();
        assert!(err.to_string().contains("Missing"), "{}", err);

        let module = GrammarModule::new_from_decls(Vec::new()).unwrap();
        assert_eq!(module.build().err().unwrap().to_string(), "Missing %grammar declaration");
    }

    #[test]
    fn rule_entry_points_are_generated() {
        let module = GrammarModule::new_from_decls(decls(quote! {
            %module words;
            %grammar "start = Word+\nWord = /[a-z]+/\n_Space = /\\s+/";
        }))
        .unwrap();
        let out = module.build().unwrap().to_string();
        assert!(out.contains("pub mod words"), "{}", out);
        assert!(out.contains("fn parse_start"), "{}", out);
        assert!(out.contains("fn parse_Word"), "{}", out);
        assert!(!out.contains("parse__Space"), "{}", out);
        assert!(out.contains("\"rule generated from the grammar\""), "{}", out);
        assert!(!out.contains("unreachable"), "{}", out);
    }

    #[test]
    fn undeclared_parent_fails() {
        let module = GrammarModule::new_from_decls(decls(quote! {
            %grammar "grammar Child extends Base\nstart = Item";
        }))
        .unwrap();
        let err = module.build().err().unwrap();
        assert!(err.to_string().contains("%extends"), "{}", err);
    }

    #[test]
    fn snippets_are_registered_once() {
        let module = GrammarModule::new_from_decls(decls(quote! {
            %grammar "start = /[a-z]+/ |> `text_len` |> `double` |> `int`\nfew = \"x\"{`n`}";
            %host double = |v| v;
        }))
        .unwrap();
        let lit = module.grammar.clone().unwrap();
        let summary = module.check(&lit).unwrap();
        let implicit = module.implicit_hosts(&lit, &summary).unwrap();
        let names: Vec<_> = implicit.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["text_len", "n"]);
    }

    #[test]
    fn extends_paths_are_relative_to_the_call_site() {
        let path = |tokens: TokenStream| relative_to_module(&syn::parse2(tokens).unwrap()).to_string();
        assert_eq!(path(quote!(base)), quote!(super::base).to_string());
        assert_eq!(path(quote!(self::base)), quote!(super::base).to_string());
        assert_eq!(path(quote!(crate::base)), quote!(crate::base).to_string());
        assert_eq!(path(quote!(::other::base)), quote!(::other::base).to_string());
    }
}

extern crate sourcer;
use sourcer::*;

grammar! {
    %module a;
    %module b;
          //~^ ERROR Module name already defined
    %grammar "start = \"x\"";
}

grammar! {
    %grammar "start = \"x\"";
    %grammar "start = \"y\"";
           //~^ ERROR Grammar already defined
}

grammar! {
    %const n = 1;
    %host n = |v| v;
       //~^ ERROR Host value `n` already defined
    %grammar "start = \"x\"{n}";
}

grammar! {
    %module c;
    %grammar "grammar C extends B\nstart = \"x\"";
           //~^ ERROR declare its module with %extends
}

grammar! {
    %module d;
    %grammar "start = \"x\" |> `1 +`";
           //~^ ERROR Host snippet `1 +` is not a Rust expression
}

fn main() {}

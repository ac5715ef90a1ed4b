extern crate sourcer;
use sourcer::*;

grammar! {
    %module a;
    %grammar "start = Missing";
           //~^ ERROR The rule "start" refers to "Missing", which is not defined.
}

grammar! {
    %module b;
    %grammar "start = \"x\"\nstart = \"y\"";
           //~^ ERROR Found two or more rules named "start".
}

grammar! {
    %module c;
    %grammar "ignore start = \" \"";
           //~^ ERROR The "start" rule must not have the "ignore" modifier.
}

grammar! {
    %module d;
    %grammar "_hidden = \"x\"";
           //~^ ERROR Found a rule that starts with an underscore
}

grammar! {
    %module e;
    %grammar "start = Pair\nPair(x) = x x";
           //~^ ERROR expects 1 argument(s), but 0 were given
}

grammar! {
    %module f;
    %grammar "start = (\"x\"";
           //~^ ERROR Syntax error on line 1
}

fn main() {}

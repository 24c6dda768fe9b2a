mod common;
mod manual;
mod routing;

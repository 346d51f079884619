pub mod errorfmt;
pub mod hex;
pub mod oserror;
pub mod xrd;

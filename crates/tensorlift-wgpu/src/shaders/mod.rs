pub mod pool2d;
